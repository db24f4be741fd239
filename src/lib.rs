//! This library provides runtime credential rotation for connections to an
//! external resource (a database, a message broker, an HTTP API) whose
//! secret changes while the application is running.
//!
//! The moving parts:
//!
//! - A [`CredentialStore`] holds the current credentials as an immutable,
//!   atomically-swapped snapshot. Anything holding a snapshot keeps a
//!   consistent view; swaps never mutate shared state in place.
//! - A [`Refresher`] fetches new secrets from a [`SecretSource`] (the
//!   shipped one reads a plaintext HTTP endpoint) on demand or on an
//!   interval, and installs them into the store.
//! - A [`Pool`] builds connections from the current snapshot through a
//!   [`Connector`] you implement, and stops reusing idle connections the
//!   moment a rotation makes them stale.
//!
//! # Refresher Usage
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use keyturn::refresher::{source::HttpSecretSource, Refresher};
//! use tokio_util::sync::CancellationToken;
//!
//! let source = HttpSecretSource::new("https://secrets.example.com/db/app_rw".parse()?)?;
//!
//! // `build` performs the bootstrap fetch.
//! let refresher = Arc::new(
//!     Refresher::builder()
//!         .with_endpoint("postgres://db.example.com".parse()?)
//!         .with_principal("app_rw")
//!         .with_source(Arc::new(source))
//!         .build()
//!         .await?,
//! );
//!
//! // Rotate in the background until shutdown.
//! let shutdown = CancellationToken::new();
//! let handle = refresher.clone().spawn(shutdown.clone());
//!
//! // Or rotate on demand.
//! refresher.refresh().await?;
//! ```
//!
//! The fetch transport can be customized by implementing the
//! [`SecretSource`] trait, or just the [`AsyncHttpClient`] trait to keep the
//! plaintext-body convention with a different HTTP stack.
//!
//! # Pool Usage
//!
//! ```ignore
//! use keyturn::pool::{connector::{ConnectError, Connector}, Pool};
//! use keyturn::core::credentials::Credentials;
//! use async_trait::async_trait;
//!
//! struct PgConnector;
//!
//! #[async_trait]
//! impl Connector for PgConnector {
//!     type Connection = PgConnection;
//!
//!     async fn connect(&self, credentials: &Credentials) -> Result<PgConnection, ConnectError> {
//!         // Report a refused secret as AuthRejected so the pool can force
//!         // a rotation and retry once.
//!         connect_pg(credentials).await
//!     }
//! }
//!
//! let pool = Pool::new(PgConnector, refresher.watch()).with_refresher(refresher.clone());
//!
//! let conn = pool.get().await?;
//! // ... use the connection ...
//! pool.put(conn).await;
//! ```
//!
//! # Rotation Semantics
//!
//! 1. *Fetch*: the refresher asks the source for the latest secret.
//! 2. *Compare*: an unchanged secret installs nothing, so pooled
//!    connections are not invalidated for nothing.
//! 3. *Swap*: a changed secret is installed as a new snapshot with the next
//!    [`RotationEpoch`]; watchers wake through
//!    [`CredentialsWatch::changed`](store::CredentialsWatch::changed).
//! 4. *Invalidate*: idle pooled connections from older epochs are dropped
//!    on their next touch. Connections already handed out are never
//!    revoked.
//!
//! A failed fetch is retried with capped exponential backoff and never
//! disturbs the installed snapshot: the store keeps serving the last good
//! credentials.
//!
//! [`CredentialStore`]: crate::store::CredentialStore
//! [`Refresher`]: crate::refresher::Refresher
//! [`SecretSource`]: crate::refresher::source::SecretSource
//! [`AsyncHttpClient`]: crate::core::util::AsyncHttpClient
//! [`Pool`]: crate::pool::Pool
//! [`Connector`]: crate::pool::connector::Connector
//! [`RotationEpoch`]: crate::core::credentials::RotationEpoch

pub mod config;
pub mod core;
pub mod pool;
pub mod refresher;
pub mod store;
