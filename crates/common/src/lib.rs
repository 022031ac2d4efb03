//! Shared configuration, error taxonomy and data model for the courier
//! dispatch pipeline.

pub mod config;
pub mod error;
pub mod types;
