//! The seam between the retry logic and an actual broker client.

use crate::Destination;
use crate::error::Result;
use async_trait::async_trait;

/// Opens broker connections.
///
/// A `Connector` is cheap configuration; every call to
/// [`connect()`](Self::connect) produces a fresh [`Link`]. The
/// [`Publisher`](crate::Publisher) decides when to call it and bounds each
/// call with its connect timeout.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Broker location, used for logging only.
    fn endpoint(&self) -> &str;

    /// Establish a connection and a channel able to publish with confirms.
    async fn connect(&self) -> Result<Box<dyn Link>>;
}

/// An open connection+channel pair.
///
/// Any error returned from a `Link` is treated as the link being broken: the
/// publisher drops it and reconnects before the next attempt.
#[async_trait]
pub trait Link: Send {
    /// Whether both the connection and the channel are still usable.
    fn is_open(&self) -> bool;

    /// Ensure the durable queue exists. Must be idempotent.
    async fn declare(&mut self, destination: &Destination) -> Result<()>;

    /// Publish a persistent message and wait for the broker's confirmation.
    async fn send(&mut self, destination: &Destination, body: &[u8]) -> Result<()>;

    /// Close the channel and connection gracefully.
    async fn close(&mut self) -> Result<()>;
}
