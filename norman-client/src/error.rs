use norman_api::PeripheralId;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Hub unreachable, timed out or answered with an HTTP error
    #[error("Failed to communicate with Norman hub at {endpoint}: {source}")]
    Communication {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{operation} failed with error code {code}: {message}")]
    Api {
        operation: &'static str,
        code: i64,
        message: String,
    },

    #[error("Invalid response from Norman hub: {0}")]
    InvalidResponse(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(#[from] Unsupported),

    #[error("Peripheral {0} is not known to the hub")]
    UnknownPeripheral(PeripheralId),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

/// Why a cover refused a command before anything was sent to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Unsupported {
    #[error("position of cover {0} has not been reported yet")]
    PositionUnknown(PeripheralId),

    #[error("tilt of cover {0} has not been reported yet")]
    TiltUnknown(PeripheralId),

    #[error("cover {0} has no tilt")]
    TiltNotSupported(PeripheralId),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn communication<E, S>(endpoint: E, source: S) -> Self
    where
        E: Into<String>,
        S: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Communication {
            endpoint: endpoint.into(),
            source: source.into(),
        }
    }

    pub fn api<M: Into<String>>(operation: &'static str, code: i64, message: Option<M>) -> Self {
        Self::Api {
            operation,
            code,
            message: message
                .map(Into::into)
                .unwrap_or_else(|| "hub reported an error".to_string()),
        }
    }

    pub fn is_communication(&self) -> bool {
        matches!(self, Error::Communication { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::UnsupportedOperation(_))
    }
}
