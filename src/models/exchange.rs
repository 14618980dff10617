use std::fmt;

use lapin::options::ExchangeDeclareOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Topic,
    Headers,
    Custom(String),
}

impl ExchangeKind {
    pub fn new(kind: &str) -> Self {
        match kind.to_lowercase().as_str() {
            "direct" => ExchangeKind::Direct,
            "fanout" => ExchangeKind::Fanout,
            "topic" => ExchangeKind::Topic,
            "headers" => ExchangeKind::Headers,
            _ => ExchangeKind::Custom(kind.to_string()),
        }
    }

    pub fn to_lapin(&self) -> lapin::ExchangeKind {
        match self {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
            ExchangeKind::Custom(name) => lapin::ExchangeKind::Custom(name.clone()),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExchangeKind::Direct => fmt.write_str("direct"),
            ExchangeKind::Fanout => fmt.write_str("fanout"),
            ExchangeKind::Topic => fmt.write_str("topic"),
            ExchangeKind::Headers => fmt.write_str("headers"),
            ExchangeKind::Custom(name) => fmt.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeDefinition {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl ExchangeDefinition {
    pub fn new(name: &str, kind: ExchangeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            durable: true,
        }
    }

    pub fn declare_options(&self) -> ExchangeDeclareOptions {
        ExchangeDeclareOptions {
            durable: self.durable,
            ..ExchangeDeclareOptions::default()
        }
    }
}
