//! Resilient publishing: lazy connect, idempotent declare, bounded retry.

use crate::connector::{Connector, Link};
use crate::error::{Error, ErrorKind, Result};
use crate::retry::{Delay, RetryPolicy, TokioDelay};
use crate::{Ack, Destination, FileRecord, RecordSink};
use async_trait::async_trait;
use exn::ResultExt;
use std::collections::HashSet;
use std::path::Path;

/// Observable connection state.
///
/// ```text
/// Disconnected ──publish──▶ Connecting ──ok──▶ Connected
///      ▲                      ▲    │               │
///      │                      └────┼── failure ────┘
///      └── retries exhausted ──────┘   or close()
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; the next publish connects lazily.
    Disconnected,
    /// A connection is being (re-)established, or the previous one broke
    /// and the next attempt will replace it.
    Connecting,
    /// A connection is held and reused for every publish.
    Connected,
}

enum State {
    Disconnected,
    Connecting,
    Connected {
        link: Box<dyn Link>,
        /// Queues declared on *this* connection.
        declared: HashSet<String>,
    },
}

/// Publishes records through a [`Connector`] with retry and reconnection.
///
/// - The connection is opened on the first publish and reused afterwards.
/// - Each destination queue is declared (durable) once per connection.
/// - A failed attempt drops the connection; the next attempt reconnects
///   after an exponential backoff, up to [`RetryPolicy::max_attempts`].
/// - When the budget is spent the record fails with
///   [`RetriesExhausted`](ErrorKind::RetriesExhausted) and the publisher is
///   left [`Disconnected`](ConnectionState::Disconnected), ready for the next
///   record.
///
/// # Examples
///
/// ```no_run
/// use rfp_publish::{AmqpConnector, AmqpSettings, Destination, Publisher, RecordSink, RetryPolicy};
///
/// # async fn example(record: rfp_scan::FileRecord) -> rfp_publish::error::Result<()> {
/// let connector = AmqpConnector::new(AmqpSettings::default());
/// let mut publisher = Publisher::new(connector, RetryPolicy::default());
/// publisher.publish(&record, &Destination::queue("file_events")).await?;
/// publisher.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct Publisher<C> {
    connector: C,
    policy: RetryPolicy,
    delay: Box<dyn Delay>,
    state: State,
}

impl<C: Connector> Publisher<C> {
    pub fn new(connector: C, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            delay: Box::new(TokioDelay),
            state: State::Disconnected,
        }
    }

    /// Replace how backoff waits are performed.
    pub fn with_delay(mut self, delay: impl Delay + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    pub fn state(&self) -> ConnectionState {
        match self.state {
            State::Disconnected => ConnectionState::Disconnected,
            State::Connecting => ConnectionState::Connecting,
            State::Connected { .. } => ConnectionState::Connected,
        }
    }

    async fn publish_body(&mut self, body: &[u8], destination: &Destination, path: &Path) -> Result<Ack> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<Error> = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                let wait = self.policy.backoff(attempt - 1);
                tracing::debug!(attempt, wait_ms = wait.as_millis() as u64, "Backing off before retrying publish");
                self.delay.wait(wait).await;
            }
            match self.try_publish(body, destination).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), queue = %destination.queue, "Published message");
                    return Ok(Ack::Confirmed);
                },
                Err(e) => {
                    let kind: &ErrorKind = &e;
                    tracing::warn!(attempt, attempts, error = %kind, "Publish attempt failed");
                    // Whatever broke, the link can't be trusted any more.
                    self.state = State::Connecting;
                    if !kind.is_retryable() {
                        self.state = State::Disconnected;
                        return Err(e);
                    }
                    last_error = Some(e);
                },
            }
        }
        self.state = State::Disconnected;
        tracing::error!(path = %path.display(), attempts, "Failed to publish message; retries exhausted");
        let exhausted = ErrorKind::RetriesExhausted { attempts };
        match last_error {
            Some(e) => Err(e.raise(exhausted)),
            None => exn::bail!(exhausted),
        }
    }

    async fn try_publish(&mut self, body: &[u8], destination: &Destination) -> Result<()> {
        self.ensure_connected().await?;
        let State::Connected { link, declared } = &mut self.state else {
            exn::bail!(ErrorKind::Connection);
        };
        if !declared.contains(&destination.queue) {
            link.declare(destination).await?;
            declared.insert(destination.queue.clone());
            tracing::info!(queue = %destination.queue, "Queue ready");
        }
        link.send(destination, body).await
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if let State::Connected { link, .. } = &self.state {
            if link.is_open() {
                return Ok(());
            }
            tracing::warn!(endpoint = self.connector.endpoint(), "Broker connection closed; reconnecting");
        }
        self.state = State::Connecting;
        let timeout = self.policy.connect_timeout;
        let link = match tokio::time::timeout(timeout, self.connector.connect()).await {
            Ok(result) => result?,
            Err(elapsed) => return Err(elapsed).or_raise(|| ErrorKind::Timeout(timeout)),
        };
        tracing::info!(endpoint = self.connector.endpoint(), "Connected to broker");
        self.state = State::Connected { link, declared: HashSet::new() };
        Ok(())
    }
}

#[async_trait]
impl<C: Connector> RecordSink for Publisher<C> {
    fn name(&self) -> &str {
        self.connector.endpoint()
    }

    async fn publish(&mut self, record: &FileRecord, destination: &Destination) -> Result<Ack> {
        // Serialization failures are a property of the record; never retried.
        let body = record.to_json().or_raise(|| ErrorKind::Serialization(record.path.clone()))?;
        self.publish_body(&body, destination, &record.path).await
    }

    async fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Disconnected) {
            State::Connected { mut link, .. } if link.is_open() => {
                link.close().await?;
                tracing::info!(endpoint = self.connector.endpoint(), "Connection to broker closed");
                Ok(())
            },
            _ => Ok(()),
        }
    }
}
