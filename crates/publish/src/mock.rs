//! In-memory broker for testing.

use crate::connector::{Connector, Link};
use crate::error::{ErrorKind, Result};
use crate::retry::Delay;
use crate::{Destination, FileRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct BrokerState {
    /// Remaining connection attempts to refuse (`u32::MAX` refuses forever).
    refuse_connects: u32,
    /// Remaining sends to fail as a broken connection.
    fail_sends: u32,
    /// Remaining sends to nack.
    reject_sends: u32,
    hang_on_connect: bool,
    /// Bumped to invalidate every link handed out so far.
    generation: u64,
    connections: u32,
    closes: u32,
    declarations: Vec<String>,
    messages: HashMap<String, Vec<Vec<u8>>>,
}

/// In-memory [`Connector`] with scriptable failures.
///
/// Clones share state, so a test keeps one handle for inspection and hands
/// another to the [`Publisher`](crate::Publisher).
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // A panicking test thread shouldn't hide the broker's state from the
        // assertions that follow.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse the next `n` connection attempts.
    pub fn fail_connects(self, n: u32) -> Self {
        self.lock().refuse_connects = n;
        self
    }

    /// Refuse every connection attempt.
    pub fn unreachable(self) -> Self {
        self.fail_connects(u32::MAX)
    }

    /// Never complete a connection attempt.
    pub fn hang_on_connect(self) -> Self {
        self.lock().hang_on_connect = true;
        self
    }

    /// Break the connection during the next `n` sends.
    pub fn fail_publishes(self, n: u32) -> Self {
        self.lock().fail_sends = n;
        self
    }

    /// Nack the next `n` sends.
    pub fn reject_publishes(self, n: u32) -> Self {
        self.lock().reject_sends = n;
        self
    }

    /// Simulate a broker restart: every open link reports itself closed.
    pub fn drop_connections(&self) {
        self.lock().generation += 1;
    }

    /// Number of successful connections.
    pub fn connections(&self) -> u32 {
        self.lock().connections
    }

    /// Number of links closed gracefully.
    pub fn closes(&self) -> u32 {
        self.lock().closes
    }

    /// Queue names in declaration order (one entry per declare call).
    pub fn declarations(&self) -> Vec<String> {
        self.lock().declarations.clone()
    }

    /// Raw message bodies delivered to `queue`.
    pub fn messages(&self, queue: &str) -> Vec<Vec<u8>> {
        self.lock().messages.get(queue).cloned().unwrap_or_default()
    }

    /// Messages delivered to `queue`, decoded from the wire format.
    ///
    /// Panics on a body that does not decode; that is a test failure.
    pub fn records(&self, queue: &str) -> Vec<FileRecord> {
        self.messages(queue)
            .iter()
            .map(|body| match FileRecord::from_json(body) {
                Ok(record) => record,
                Err(e) => panic!("MockBroker::records: undecodable message: {e}"),
            })
            .collect()
    }
}

#[async_trait]
impl Connector for MockBroker {
    fn endpoint(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<Box<dyn Link>> {
        let hang = self.lock().hang_on_connect;
        if hang {
            std::future::pending::<()>().await;
        }
        let mut state = self.lock();
        if state.refuse_connects > 0 {
            if state.refuse_connects != u32::MAX {
                state.refuse_connects -= 1;
            }
            exn::bail!(ErrorKind::Connection);
        }
        state.connections += 1;
        let generation = state.generation;
        Ok(Box::new(MockLink { broker: self.clone(), generation, open: true }))
    }
}

struct MockLink {
    broker: MockBroker,
    generation: u64,
    open: bool,
}

#[async_trait]
impl Link for MockLink {
    fn is_open(&self) -> bool {
        self.open && self.broker.lock().generation == self.generation
    }

    async fn declare(&mut self, destination: &Destination) -> Result<()> {
        let mut state = self.broker.lock();
        state.declarations.push(destination.queue.clone());
        state.messages.entry(destination.queue.clone()).or_default();
        Ok(())
    }

    async fn send(&mut self, destination: &Destination, body: &[u8]) -> Result<()> {
        let mut state = self.broker.lock();
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            self.open = false;
            exn::bail!(ErrorKind::Connection);
        }
        if state.reject_sends > 0 {
            state.reject_sends -= 1;
            exn::bail!(ErrorKind::Rejected);
        }
        state.messages.entry(destination.queue.clone()).or_default().push(body.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.broker.lock().closes += 1;
        self.open = false;
        Ok(())
    }
}

/// [`Delay`] that returns immediately and remembers what it was asked for.
#[derive(Clone, Default)]
pub struct InstantDelay {
    waits: Arc<Mutex<Vec<Duration>>>,
}
impl InstantDelay {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Delay for InstantDelay {
    async fn wait(&self, duration: Duration) {
        self.waits.lock().unwrap_or_else(PoisonError::into_inner).push(duration);
    }
}
