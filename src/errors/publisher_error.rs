use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use thiserror::Error;

// custom error, based on 'thiserror' library
#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("cannot connect to amqp broker at {address}: {source}")]
    Connection { address: String, source: lapin::Error },
    #[error("{resource} '{name}' already exists with different properties: {source}")]
    ResourceConflict {
        resource: &'static str,
        name: String,
        source: lapin::Error,
    },
    #[error("amqp channel error while trying to {operation}: {source}")]
    Channel { operation: String, source: lapin::Error },
    #[error("amqp i/o error while trying to {operation}: {source}")]
    Io { operation: String, source: lapin::Error },
    #[error("amqp_client not initialized: {0}")]
    Uninitialized(String),
    #[error("cannot write to console: {0}")]
    Output(#[from] std::io::Error),
}

impl PublisherError {
    // classify a failure returned by the broker after the connection is open
    pub fn from_broker(operation: impl Into<String>, err: lapin::Error) -> Self {
        let operation = operation.into();
        if matches!(err, lapin::Error::IOError(_)) {
            return PublisherError::Io { operation, source: err };
        }
        PublisherError::Channel { operation, source: err }
    }

    // like `from_broker`, but a PRECONDITION_FAILED reply means the resource
    // was already declared with other properties
    pub fn from_declare(resource: &'static str, name: &str, err: lapin::Error) -> Self {
        if is_precondition_failed(&err) {
            return PublisherError::ResourceConflict {
                resource,
                name: name.to_string(),
                source: err,
            };
        }
        Self::from_broker(format!("declare {} '{}'", resource, name), err)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            PublisherError::Connection { .. } => 2,
            PublisherError::ResourceConflict { .. } => 3,
            PublisherError::Channel { .. } => 4,
            PublisherError::Io { .. } => 5,
            PublisherError::Config(_) | PublisherError::Uninitialized(_) | PublisherError::Output(_) => 1,
        }
    }
}

fn is_precondition_failed(err: &lapin::Error) -> bool {
    match err {
        lapin::Error::ProtocolError(amqp_error) => {
            matches!(amqp_error.kind(), AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED))
        }
        _ => false,
    }
}
