//! RabbitMQ (AMQP 0-9-1) connector built on `lapin`.

use crate::Destination;
use crate::connector::{Connector, Link};
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::ResultExt;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::fmt;
use tracing::instrument;

const CONTENT_TYPE: &str = "application/json";
/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct AmqpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
        }
    }
}

impl fmt::Debug for AmqpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmqpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .finish()
    }
}

impl AmqpSettings {
    fn uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.username.clone(),
                    password: self.password.clone(),
                },
                host: self.host.clone(),
                port: self.port,
            },
            vhost: self.vhost.clone(),
            ..Default::default()
        }
    }
}

/// Connects to a RabbitMQ broker with publisher confirms enabled.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    settings: AmqpSettings,
    endpoint: String,
}

impl AmqpConnector {
    pub fn new(settings: AmqpSettings) -> Self {
        let endpoint = format!("amqp://{}:{}{}", settings.host, settings.port, settings.vhost);
        Self { settings, endpoint }
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn connect(&self) -> Result<Box<dyn Link>> {
        // Run lapin's tasks and socket polling on the caller's tokio runtime.
        let properties = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);
        let connection = Connection::connect_uri(self.settings.uri(), properties)
            .await
            .or_raise(|| ErrorKind::Connection)?;
        let channel = connection.create_channel().await.or_raise(|| ErrorKind::Connection)?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .or_raise(|| ErrorKind::Connection)?;
        Ok(Box::new(AmqpLink { connection, channel }))
    }
}

struct AmqpLink {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl Link for AmqpLink {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn declare(&mut self, destination: &Destination) -> Result<()> {
        let options = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        self.channel
            .queue_declare(&destination.queue, options, FieldTable::default())
            .await
            .or_raise(|| ErrorKind::Connection)?;
        Ok(())
    }

    async fn send(&mut self, destination: &Destination, body: &[u8]) -> Result<()> {
        let properties = BasicProperties::default()
            .with_content_type(CONTENT_TYPE.into())
            .with_delivery_mode(PERSISTENT);
        // Default exchange: the routing key is the queue name.
        let confirmation = self
            .channel
            .basic_publish("", &destination.queue, BasicPublishOptions::default(), body, properties)
            .await
            .or_raise(|| ErrorKind::Connection)?
            .await
            .or_raise(|| ErrorKind::Connection)?;
        if confirmation.is_nack() {
            exn::bail!(ErrorKind::Rejected);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.channel.status().connected() {
            self.channel.close(200, "OK").await.or_raise(|| ErrorKind::Close)?;
        }
        if self.connection.status().connected() {
            self.connection.close(200, "OK").await.or_raise(|| ErrorKind::Close)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AmqpSettings::default();
        assert_eq!(settings.host, "localhost");
        assert_eq!(settings.port, 5672);
        assert_eq!(settings.vhost, "/");
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = AmqpSettings {
            password: "hunter2".to_string(),
            ..Default::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_uri_carries_settings() {
        let settings = AmqpSettings {
            host: "rabbit.internal".to_string(),
            port: 5673,
            username: "svc".to_string(),
            password: "secret".to_string(),
            vhost: "files".to_string(),
        };
        let uri = settings.uri();
        assert_eq!(uri.authority.host, "rabbit.internal");
        assert_eq!(uri.authority.port, 5673);
        assert_eq!(uri.authority.userinfo.username, "svc");
        assert_eq!(uri.authority.userinfo.password, "secret");
        assert_eq!(uri.vhost, "files");
    }

    #[test]
    fn test_endpoint_omits_credentials() {
        let connector = AmqpConnector::new(AmqpSettings::default());
        assert_eq!(connector.endpoint(), "amqp://localhost:5672/");
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop a listener to find a local port nobody is serving.
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let connector = AmqpConnector::new(AmqpSettings {
            host: "127.0.0.1".to_string(),
            port,
            ..Default::default()
        });
        let result = tokio::time::timeout(std::time::Duration::from_secs(10), connector.connect()).await.unwrap();
        let err = result.err().unwrap();
        assert!(matches!(&*err, ErrorKind::Connection));
    }
}
