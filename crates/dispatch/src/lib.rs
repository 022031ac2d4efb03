//! Push-notification dispatch pipeline.
//!
//! A [`Supervisor`] accepts batches from a provider and fans them out over a
//! fixed pool of workers, each bound to one gateway connection and served by
//! a pool of senders. Transport failures are retried with a bounded budget,
//! terminal gateway rejections can be forwarded to an external hook command,
//! and shutdown drains in-flight work within a bounded time.
//!
//! Delivery is best effort: once a batch is admitted the caller is never told
//! about its outcome, and every internal queue sheds load instead of growing
//! when it is full.

pub mod classifier;
pub mod command;
pub mod flow;
pub mod gateway;
pub mod handler;
pub mod queue;
pub mod retry;
pub mod sender;
pub mod shutdown;
pub mod stats;
pub mod supervisor;
pub mod worker;

pub use gateway::{Connector, GatewayClient};
pub use handler::{Handlers, ResponseHandler};
pub use supervisor::{DrainOutcome, Supervisor};
