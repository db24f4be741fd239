use async_trait::async_trait;
use thiserror::Error;

use crate::core::credentials::Credentials;

/// Errors produced while establishing a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The resource refused the presented credentials.
    ///
    /// With a refresher attached to the pool this triggers one forced
    /// refresh and a single reconnect before reaching the caller.
    #[error("authentication rejected for principal '{principal}'")]
    AuthRejected { principal: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConnectError {
    pub fn auth_rejected(principal: impl Into<String>) -> Self {
        Self::AuthRejected {
            principal: principal.into(),
        }
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::AuthRejected { .. })
    }
}

/// Establishes connections to the external resource from a credential
/// snapshot.
///
/// Implementations must report a refused secret as
/// [ConnectError::AuthRejected]; anything else (network failures, protocol
/// errors) belongs in [ConnectError::Other].
#[async_trait]
pub trait Connector {
    type Connection: Send;

    async fn connect(&self, credentials: &Credentials)
        -> Result<Self::Connection, ConnectError>;
}
