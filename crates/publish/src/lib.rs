//! Publishing [`FileRecord`]s onto a durable queue.
//!
//! The orchestrator only ever talks to a [`RecordSink`]:
//!
//! - [`Publisher`] wraps a [`Connector`] (normally [`AmqpConnector`]) with
//!   lazy connection, idempotent queue declaration and bounded
//!   retry/reconnect,
//! - [`DryRun`] logs what would have been published and touches nothing.
//!
//! With the `mock` feature, [`MockBroker`](mock::MockBroker) provides an
//! in-memory [`Connector`] with scriptable failures for tests.

mod amqp;
mod connector;
mod dry_run;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
mod publisher;
mod retry;

pub use crate::amqp::{AmqpConnector, AmqpSettings};
pub use crate::connector::{Connector, Link};
pub use crate::dry_run::DryRun;
pub use crate::publisher::{ConnectionState, Publisher};
pub use crate::retry::{Delay, RetryPolicy, TokioDelay};
use async_trait::async_trait;
use error::Result;
pub use rfp_scan::FileRecord;

/// A named durable queue, addressed through the broker's default exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub queue: String,
}
impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Self { queue: name.into() }
    }
}

/// How a record left the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// The broker confirmed the message.
    Confirmed,
    /// Nothing was sent; the message was only logged.
    Logged,
}

/// Somewhere records go once discovered.
///
/// Implementations handle one record at a time; callers await each publish
/// before pulling the next record.
#[async_trait]
pub trait RecordSink: Send {
    /// Name for logging.
    fn name(&self) -> &str;

    /// Deliver a single record to `destination`.
    ///
    /// An `Err` is terminal for this record only; the sink remains usable
    /// for the next one.
    async fn publish(&mut self, record: &FileRecord, destination: &Destination) -> Result<Ack>;

    /// Release any held resources (broker connections). Safe to call more
    /// than once.
    async fn close(&mut self) -> Result<()>;
}
