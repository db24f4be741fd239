use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    core::credentials::{Credentials, RotationEpoch},
    refresher::Refresher,
    store::CredentialsWatch,
};

pub mod connector;

use connector::{ConnectError, Connector};

/// Idle connections kept for reuse unless configured otherwise.
const DEFAULT_MAX_IDLE: usize = 8;

/// A connection checked out of a [Pool], stamped with the epoch of the
/// snapshot it was built from.
#[derive(Debug)]
pub struct Pooled<T> {
    conn: T,
    epoch: RotationEpoch,
}

impl<T> Pooled<T> {
    /// The epoch of the snapshot this connection authenticated with.
    pub fn epoch(&self) -> RotationEpoch {
        self.epoch
    }

    pub fn get(&self) -> &T {
        &self.conn
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.conn
    }

    /// Detach the connection from pool bookkeeping.
    pub fn into_inner(self) -> T {
        self.conn
    }
}

/// Hands out connections built from the current credential snapshot.
///
/// Idle connections are reused only while their epoch matches the store's;
/// a rotation strands them, and they are dropped on the next checkout or
/// checkin. Connections already handed out are unaffected and run to
/// completion against the snapshot they were built from.
pub struct Pool<C: Connector> {
    connector: C,
    watch: CredentialsWatch,
    idle: Mutex<Vec<Pooled<C::Connection>>>,
    max_idle: usize,
    refresher: Option<Arc<Refresher>>,
}

impl<C: Connector> Pool<C> {
    /// Create a pool reading credential snapshots through `watch`.
    pub fn new(connector: C, watch: CredentialsWatch) -> Self {
        Self {
            connector,
            watch,
            idle: Mutex::new(Vec::new()),
            max_idle: DEFAULT_MAX_IDLE,
            refresher: None,
        }
    }

    /// Cap the number of idle connections kept for reuse.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Attach a refresher, enabling one forced rotation when the resource
    /// rejects the current credentials.
    pub fn with_refresher(mut self, refresher: Arc<Refresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Check out a connection built from the current snapshot.
    ///
    /// Prefers an idle connection from the same epoch. On an authentication
    /// rejection with a refresher attached, forces one refresh and retries
    /// the connect once with the new snapshot; a second rejection
    /// propagates.
    pub async fn get(&self) -> Result<Pooled<C::Connection>, ConnectError> {
        let credentials = self.watch.current();

        if let Some(pooled) = self.pop_idle(credentials.epoch()).await {
            return Ok(pooled);
        }

        let rejected = match self.connect(&credentials).await {
            Ok(pooled) => return Ok(pooled),
            Err(error @ ConnectError::AuthRejected { .. }) => error,
            Err(error) => return Err(error),
        };

        let Some(refresher) = &self.refresher else {
            return Err(rejected);
        };

        warn!(
            principal = credentials.principal(),
            epoch = %credentials.epoch(),
            "credentials rejected, forcing a refresh"
        );

        if let Err(error) = refresher.refresh().await {
            warn!(%error, "forced refresh failed");
            return Err(rejected);
        }

        let refreshed = self.watch.current();
        if refreshed.epoch() == credentials.epoch() {
            // The source still serves the secret that was just rejected.
            return Err(rejected);
        }

        self.connect(&refreshed).await
    }

    /// Return a connection for reuse.
    ///
    /// Connections stranded by a rotation, and overflow beyond the idle
    /// cap, are dropped.
    pub async fn put(&self, pooled: Pooled<C::Connection>) {
        if pooled.epoch != self.watch.epoch() {
            debug!(epoch = %pooled.epoch, "dropping stale connection on checkin");
            return;
        }

        let mut idle = self.idle.lock().await;
        if idle.len() < self.max_idle {
            idle.push(pooled);
        }
    }

    /// Number of idle connections currently held.
    pub async fn idle_len(&self) -> usize {
        self.idle.lock().await.len()
    }

    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Pooled<C::Connection>, ConnectError> {
        let conn = self.connector.connect(credentials).await?;
        debug!(epoch = %credentials.epoch(), "established connection");
        Ok(Pooled {
            conn,
            epoch: credentials.epoch(),
        })
    }

    async fn pop_idle(&self, epoch: RotationEpoch) -> Option<Pooled<C::Connection>> {
        let mut idle = self.idle.lock().await;
        let before = idle.len();
        idle.retain(|pooled| pooled.epoch == epoch);
        let dropped = before - idle.len();
        if dropped > 0 {
            debug!(dropped, "discarded idle connections from previous epochs");
        }
        idle.pop()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    };

    use async_trait::async_trait;

    use crate::{core::credentials::Secret, store::CredentialStore};

    use super::*;

    /// Accepts exactly one secret; every accepted connect gets a fresh id.
    #[derive(Debug, Clone)]
    struct KeyedConnector {
        accepts: Arc<StdMutex<String>>,
        connects: Arc<AtomicUsize>,
    }

    impl KeyedConnector {
        fn new(accepts: &str) -> Self {
            Self {
                accepts: Arc::new(StdMutex::new(accepts.to_owned())),
                connects: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Connector for KeyedConnector {
        type Connection = usize;

        async fn connect(&self, credentials: &Credentials) -> Result<usize, ConnectError> {
            if credentials.secret().reveal() != *self.accepts.lock().unwrap() {
                return Err(ConnectError::auth_rejected(credentials.principal()));
            }
            Ok(self.connects.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn store(secret: &str) -> CredentialStore {
        CredentialStore::new(Credentials::new(
            "postgres://db.example.com/".parse().unwrap(),
            "app_rw",
            Secret::new(secret),
        ))
    }

    #[tokio::test]
    async fn checkin_then_checkout_reuses_the_connection() {
        let connector = KeyedConnector::new("s0");
        let store = store("s0");
        let pool = Pool::new(connector.clone(), store.subscribe());

        let first = pool.get().await.unwrap();
        let id = *first.get();
        pool.put(first).await;

        let second = pool.get().await.unwrap();
        assert_eq!(id, *second.get());
        assert_eq!(1, connector.connects.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn rotation_invalidates_idle_connections() {
        let connector = KeyedConnector::new("s0");
        let store = store("s0");
        let pool = Pool::new(connector.clone(), store.subscribe());

        let first = pool.get().await.unwrap();
        pool.put(first).await;
        assert_eq!(1, pool.idle_len().await);

        *connector.accepts.lock().unwrap() = "s1".to_owned();
        store.rotate_secret(Secret::new("s1"));

        let second = pool.get().await.unwrap();
        assert_eq!(RotationEpoch(1), second.epoch());
        assert_eq!(2, connector.connects.load(Ordering::SeqCst));
        assert_eq!(0, pool.idle_len().await);
    }

    #[tokio::test]
    async fn stale_connections_are_dropped_on_checkin() {
        let connector = KeyedConnector::new("s0");
        let store = store("s0");
        let pool = Pool::new(connector.clone(), store.subscribe());

        let conn = pool.get().await.unwrap();
        store.rotate_secret(Secret::new("s1"));
        pool.put(conn).await;

        assert_eq!(0, pool.idle_len().await);
    }

    #[tokio::test]
    async fn idle_cap_is_enforced() {
        let connector = KeyedConnector::new("s0");
        let store = store("s0");
        let pool = Pool::new(connector.clone(), store.subscribe()).with_max_idle(1);

        let first = pool.get().await.unwrap();
        let second = pool.get().await.unwrap();
        pool.put(first).await;
        pool.put(second).await;

        assert_eq!(1, pool.idle_len().await);
    }

    #[tokio::test]
    async fn auth_rejection_without_a_refresher_propagates() {
        let connector = KeyedConnector::new("s1");
        let store = store("s0");
        let pool = Pool::new(connector.clone(), store.subscribe());

        let err = pool.get().await.unwrap_err();
        assert!(err.is_auth_rejected());
    }
}
