use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single notification addressed to one device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub token: String,
    pub payload: serde_json::Value,
    /// Number of resends already scheduled for this request.
    #[serde(default)]
    pub tries: u32,
}

impl Request {
    pub fn new(token: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            token: token.into(),
            payload,
            tries: 0,
        }
    }
}

/// A batch of requests handed over by the provider in one call.
pub type Batch = Vec<Request>;

/// Reply received from the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status_code: u16,
    /// Message id assigned by the gateway.
    pub apns_id: String,
}

/// Reason codes reported by the gateway when it refuses a notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorReason {
    BadCollapseId,
    BadDeviceToken,
    BadExpirationDate,
    BadMessageId,
    BadPriority,
    BadTopic,
    DeviceTokenNotForTopic,
    MissingDeviceToken,
    MissingTopic,
    PayloadEmpty,
    TopicDisallowed,
    BadCertificate,
    ExpiredProviderToken,
    Forbidden,
    Unregistered,
    PayloadTooLarge,
    TooManyRequests,
    InternalServerError,
    ServiceUnavailable,
    Shutdown,
    Other(String),
}

impl ErrorReason {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorReason::BadCollapseId => "BadCollapseId",
            ErrorReason::BadDeviceToken => "BadDeviceToken",
            ErrorReason::BadExpirationDate => "BadExpirationDate",
            ErrorReason::BadMessageId => "BadMessageId",
            ErrorReason::BadPriority => "BadPriority",
            ErrorReason::BadTopic => "BadTopic",
            ErrorReason::DeviceTokenNotForTopic => "DeviceTokenNotForTopic",
            ErrorReason::MissingDeviceToken => "MissingDeviceToken",
            ErrorReason::MissingTopic => "MissingTopic",
            ErrorReason::PayloadEmpty => "PayloadEmpty",
            ErrorReason::TopicDisallowed => "TopicDisallowed",
            ErrorReason::BadCertificate => "BadCertificate",
            ErrorReason::ExpiredProviderToken => "ExpiredProviderToken",
            ErrorReason::Forbidden => "Forbidden",
            ErrorReason::Unregistered => "Unregistered",
            ErrorReason::PayloadTooLarge => "PayloadTooLarge",
            ErrorReason::TooManyRequests => "TooManyRequests",
            ErrorReason::InternalServerError => "InternalServerError",
            ErrorReason::ServiceUnavailable => "ServiceUnavailable",
            ErrorReason::Shutdown => "Shutdown",
            ErrorReason::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorReason {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "BadCollapseId" => ErrorReason::BadCollapseId,
            "BadDeviceToken" => ErrorReason::BadDeviceToken,
            "BadExpirationDate" => ErrorReason::BadExpirationDate,
            "BadMessageId" => ErrorReason::BadMessageId,
            "BadPriority" => ErrorReason::BadPriority,
            "BadTopic" => ErrorReason::BadTopic,
            "DeviceTokenNotForTopic" => ErrorReason::DeviceTokenNotForTopic,
            "MissingDeviceToken" => ErrorReason::MissingDeviceToken,
            "MissingTopic" => ErrorReason::MissingTopic,
            "PayloadEmpty" => ErrorReason::PayloadEmpty,
            "TopicDisallowed" => ErrorReason::TopicDisallowed,
            "BadCertificate" => ErrorReason::BadCertificate,
            "ExpiredProviderToken" => ErrorReason::ExpiredProviderToken,
            "Forbidden" => ErrorReason::Forbidden,
            "Unregistered" => ErrorReason::Unregistered,
            "PayloadTooLarge" => ErrorReason::PayloadTooLarge,
            "TooManyRequests" => ErrorReason::TooManyRequests,
            "InternalServerError" => ErrorReason::InternalServerError,
            "ServiceUnavailable" => ErrorReason::ServiceUnavailable,
            "Shutdown" => ErrorReason::Shutdown,
            other => ErrorReason::Other(other.to_string()),
        })
    }
}

impl Serialize for ErrorReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|never| match never {}))
    }
}
