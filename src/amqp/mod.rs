use async_trait::async_trait;
use log::{debug, error, info};

use lapin::uri::AMQPUri;
use lapin::{options::BasicPublishOptions, BasicProperties, Channel, Connection, ConnectionProperties};

use crate::errors::publisher_error::PublisherError;
use crate::models::exchange::ExchangeDefinition;
use crate::models::queue::{QueueBinding, QueueDefinition};

const CLOSE_REPLY_CODE: u16 = 200;
const CLOSE_REPLY_TEXT: &str = "OK";

// The operations the publish sequence needs from a broker, one broker round-trip each.
#[async_trait]
pub trait Broker {
    async fn connect(&mut self) -> Result<(), PublisherError>;
    async fn declare_exchange(&mut self, exchange: &ExchangeDefinition) -> Result<(), PublisherError>;
    async fn declare_queue(&mut self, queue: &QueueDefinition) -> Result<(), PublisherError>;
    async fn bind_queue(&mut self, binding: &QueueBinding) -> Result<(), PublisherError>;
    // fire and forget, the publisher confirm is never awaited
    async fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<(), PublisherError>;
    async fn close(&mut self) -> Result<(), PublisherError>;
}

pub struct AmqpClient {
    connection: Option<Connection>,
    channel: Option<Channel>,
    pub amqp_uri: AMQPUri,
    pub broker_address: String,
}

impl AmqpClient {
    pub fn new(amqp_uri: AMQPUri, broker_address: String) -> Self {
        Self {
            connection: None,
            channel: None,
            amqp_uri,
            broker_address,
        }
    }

    pub fn is_connected(&self) -> bool {
        match (&self.connection, &self.channel) {
            (Some(connection), Some(channel)) => connection.status().connected() && channel.status().connected(),
            _ => false,
        }
    }

    async fn create_connection(&mut self) -> Result<(), PublisherError> {
        info!(target: "app", "create_connection - creating AMQP connection to {}...", &self.broker_address);
        let options = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);
        let connection = Connection::connect_uri(self.amqp_uri.clone(), options)
            .await
            .map_err(|err| {
                error!(target: "app", "create_connection - cannot create AMQP connection. Err = {:?}", err);
                PublisherError::Connection {
                    address: self.broker_address.clone(),
                    source: err,
                }
            })?;
        info!(target: "app", "create_connection - AMQP connection established");
        connection.on_error(|err| {
            error!(target: "app", "create_connection - AMQP connection error = {:?}", err);
        });
        self.connection = Some(connection);
        Ok(())
    }

    // private method that must be called after create_connection()
    async fn create_channel(&mut self) -> Result<(), PublisherError> {
        info!(target: "app", "create_channel - creating AMQP channel...");
        let channel = self
            .connection()?
            .create_channel()
            .await
            .map_err(|err| {
                error!(target: "app", "create_channel - cannot create AMQP channel. Err = {:?}", err);
                PublisherError::from_broker("open a channel", err)
            })?;
        info!(target: "app", "create_channel - AMQP channel created");
        self.channel = Some(channel);
        Ok(())
    }

    fn connection(&self) -> Result<&Connection, PublisherError> {
        self.connection.as_ref().ok_or_else(|| {
            error!(target: "app", "connection - amqp_client connection not initialized. You must call connect()");
            PublisherError::Uninitialized(String::from(
                "amqp_client connection not initialized. You must call connect()",
            ))
        })
    }

    fn channel(&self) -> Result<&Channel, PublisherError> {
        self.channel.as_ref().ok_or_else(|| {
            error!(target: "app", "channel - amqp_client channel not initialized. You must call connect()");
            PublisherError::Uninitialized(String::from(
                "amqp_client channel not initialized. You must call connect()",
            ))
        })
    }
}

#[async_trait]
impl Broker for AmqpClient {
    async fn connect(&mut self) -> Result<(), PublisherError> {
        self.create_connection().await?;
        self.create_channel().await
    }

    async fn declare_exchange(&mut self, exchange: &ExchangeDefinition) -> Result<(), PublisherError> {
        info!(target: "app", "declare_exchange - declaring {} exchange '{}'...", exchange.kind, exchange.name);
        self.channel()?
            .exchange_declare(
                &exchange.name,
                exchange.kind.to_lapin(),
                exchange.declare_options(),
                Default::default(),
            )
            .await
            .map_err(|err| {
                error!(target: "app", "declare_exchange - cannot declare exchange '{}'. Err = {:?}", exchange.name, err);
                PublisherError::from_declare("exchange", &exchange.name, err)
            })
    }

    async fn declare_queue(&mut self, queue: &QueueDefinition) -> Result<(), PublisherError> {
        info!(target: "app", "declare_queue - declaring queue '{}' with ttl {} ms...", queue.name, queue.message_ttl);
        let declared = self
            .channel()?
            .queue_declare(&queue.name, queue.declare_options(), queue.arguments())
            .await
            .map_err(|err| {
                error!(target: "app", "declare_queue - cannot declare queue '{}'. Err = {:?}", queue.name, err);
                PublisherError::from_declare("queue", &queue.name, err)
            })?;
        debug!(target: "app", "declare_queue - queue '{}' holds {} messages", queue.name, declared.message_count());
        Ok(())
    }

    async fn bind_queue(&mut self, binding: &QueueBinding) -> Result<(), PublisherError> {
        info!(target: "app", "bind_queue - binding queue '{}' to exchange '{}' with routing key '{}'", binding.queue, binding.exchange, binding.routing_key);
        self.channel()?
            .queue_bind(
                &binding.queue,
                &binding.exchange,
                &binding.routing_key,
                binding.bind_options(),
                Default::default(),
            )
            .await
            .map_err(|err| {
                error!(target: "app", "bind_queue - cannot bind queue '{}'. Err = {:?}", binding.queue, err);
                PublisherError::from_broker(format!("bind queue '{}'", binding.queue), err)
            })
    }

    async fn publish(&mut self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<(), PublisherError> {
        debug!(target: "app", "publish - publishing {} bytes to exchange '{}'", payload.len(), exchange);
        self.channel()?
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|err| {
                error!(target: "app", "publish - cannot publish message to exchange '{}'. Err = {:?}", exchange, err);
                PublisherError::from_broker(format!("publish to exchange '{}'", exchange), err)
            })?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), PublisherError> {
        info!(target: "app", "close - closing AMQP connection...");
        self.connection()?
            .close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT)
            .await
            .map_err(|err| {
                error!(target: "app", "close - cannot close AMQP connection. Err = {:?}", err);
                PublisherError::from_broker("close the connection", err)
            })?;
        self.channel = None;
        self.connection = None;
        info!(target: "app", "close - AMQP connection closed");
        Ok(())
    }
}
