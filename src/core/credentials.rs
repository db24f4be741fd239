use std::fmt;

use serde::Deserialize;
use url::Url;

/// Identifies one installed credential snapshot.
///
/// Epochs are stamped by the store and strictly increase with every swap,
/// starting at 0 for the bootstrap snapshot. A connection built from an
/// older epoch than the store's current one is stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RotationEpoch(pub(crate) u64);

impl RotationEpoch {
    pub(crate) fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for RotationEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A secret value that stays out of logs.
///
/// `Debug` is redacted; the raw value is only reachable through
/// [`Secret::reveal`].
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw secret, for presenting to the external resource.
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// An immutable credential snapshot for the external resource.
///
/// The endpoint and principal are fixed for the lifetime of the store;
/// rotation only ever replaces the secret. Snapshots are shared as `Arc`s
/// and never mutated after install, so anything holding one keeps a
/// consistent view for as long as it needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    endpoint: Url,
    principal: String,
    secret: Secret,
    epoch: RotationEpoch,
}

impl Credentials {
    pub fn new(endpoint: Url, principal: impl Into<String>, secret: Secret) -> Self {
        Self {
            endpoint,
            principal: principal.into(),
            secret,
            epoch: RotationEpoch::default(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    pub fn epoch(&self) -> RotationEpoch {
        self.epoch
    }

    /// Derive the next snapshot, carrying the endpoint and principal
    /// forward. The epoch is stamped by the store on install.
    pub fn rotated(&self, secret: Secret) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            principal: self.principal.clone(),
            secret,
            epoch: self.epoch,
        }
    }

    pub(crate) fn with_epoch(mut self, epoch: RotationEpoch) -> Self {
        self.epoch = epoch;
        self
    }
}
