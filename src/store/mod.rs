use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::core::credentials::{Credentials, RotationEpoch, Secret};

/// Holds the authoritative credential snapshot for one external resource.
///
/// Readers receive an `Arc` to an immutable snapshot. Installing a new one
/// swaps the whole snapshot atomically rather than mutating fields on a
/// shared value, so an operation that already holds a snapshot keeps a
/// consistent endpoint/principal/secret triple until it finishes.
#[derive(Debug)]
pub struct CredentialStore {
    tx: watch::Sender<Arc<Credentials>>,
}

impl CredentialStore {
    /// Create a store with its bootstrap snapshot at epoch 0.
    pub fn new(initial: Credentials) -> Self {
        let initial = initial.with_epoch(RotationEpoch::default());
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// The latest snapshot.
    pub fn current(&self) -> Arc<Credentials> {
        self.tx.borrow().clone()
    }

    /// The epoch of the latest snapshot.
    pub fn epoch(&self) -> RotationEpoch {
        self.tx.borrow().epoch()
    }

    /// Atomically install a new snapshot, returning its epoch.
    ///
    /// The epoch is stamped here, not taken from the caller, so epochs
    /// strictly increase across every install.
    pub fn replace(&self, new: Credentials) -> RotationEpoch {
        let mut installed = RotationEpoch::default();
        self.tx.send_modify(|current| {
            installed = current.epoch().next();
            *current = Arc::new(new.with_epoch(installed));
        });
        debug!(epoch = %installed, "installed credential snapshot");
        installed
    }

    /// Install a snapshot carrying `secret` unless it matches the current
    /// one.
    ///
    /// Returns the new epoch, or `None` when the secret is unchanged. The
    /// comparison and the swap happen under the same lock, so two refreshers
    /// racing on the same secret install it once.
    pub fn rotate_secret(&self, secret: Secret) -> Option<RotationEpoch> {
        let mut installed = None;
        self.tx.send_if_modified(|current| {
            if current.secret() == &secret {
                return false;
            }
            let epoch = current.epoch().next();
            *current = Arc::new(current.rotated(secret).with_epoch(epoch));
            installed = Some(epoch);
            true
        });
        if let Some(epoch) = installed {
            debug!(epoch = %epoch, "installed credential snapshot");
        }
        installed
    }

    /// Subscribe to snapshot swaps.
    pub fn subscribe(&self) -> CredentialsWatch {
        CredentialsWatch(self.tx.subscribe())
    }
}

/// Read handle observing credential swaps.
///
/// Cheap to clone; every clone tracks which snapshots it has already seen
/// independently.
#[derive(Debug, Clone)]
pub struct CredentialsWatch(watch::Receiver<Arc<Credentials>>);

impl CredentialsWatch {
    /// The latest snapshot.
    pub fn current(&self) -> Arc<Credentials> {
        self.0.borrow().clone()
    }

    /// The epoch of the latest snapshot.
    pub fn epoch(&self) -> RotationEpoch {
        self.0.borrow().epoch()
    }

    /// Wait until a snapshot newer than the last one seen through this
    /// handle is installed, and return it.
    ///
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Credentials>> {
        self.0.changed().await.ok()?;
        Some(self.0.borrow_and_update().clone())
    }
}
