use lapin::options::{QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable, ShortString};

pub const MESSAGE_TTL_ARGUMENT: &str = "x-message-ttl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub name: String,
    pub durable: bool,
    // milliseconds, sent as a signed 32-bit table value
    pub message_ttl: i32,
}

impl QueueDefinition {
    pub fn new(name: &str, message_ttl: i32) -> Self {
        Self {
            name: name.to_string(),
            durable: true,
            message_ttl,
        }
    }

    pub fn declare_options(&self) -> QueueDeclareOptions {
        QueueDeclareOptions {
            durable: self.durable,
            ..QueueDeclareOptions::default()
        }
    }

    pub fn arguments(&self) -> FieldTable {
        let mut arguments = FieldTable::default();
        arguments.insert(
            ShortString::from(MESSAGE_TTL_ARGUMENT),
            AMQPValue::LongInt(self.message_ttl),
        );
        arguments
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

impl QueueBinding {
    pub fn new(queue: &str, exchange: &str, routing_key: &str) -> Self {
        Self {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        }
    }

    pub fn bind_options(&self) -> QueueBindOptions {
        QueueBindOptions::default()
    }
}
