use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use thiserror::Error;
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::RotationConfig,
    core::credentials::{Credentials, RotationEpoch, Secret},
    store::{CredentialStore, CredentialsWatch},
};

pub mod retry;
pub mod source;

use retry::RetryPolicy;
use source::{HttpSecretSource, SecretSource};

/// Interval between background refreshes unless configured otherwise.
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Outcome of a single refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The fetched secret matches the current snapshot; nothing was
    /// installed.
    Unchanged,
    /// A new snapshot was installed at this epoch.
    Rotated(RotationEpoch),
}

/// Errors surfaced by [Refresher::refresh].
///
/// None of these disturb the store: a failed refresh leaves the last good
/// snapshot in place.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The source could not produce a secret.
    #[error("failed to fetch secret: {0:#}")]
    Fetch(anyhow::Error),
    /// The source produced an empty secret, which is never installed.
    #[error("secret source returned an empty secret")]
    EmptySecret,
}

/// Keeps a [CredentialStore] supplied with fresh secrets.
///
/// A refresher can be driven on demand through [refresh](Refresher::refresh),
/// in the background through [spawn](Refresher::spawn), or both.
#[derive(Debug)]
pub struct Refresher {
    store: Arc<CredentialStore>,
    source: Arc<dyn SecretSource + Send + Sync>,
    interval: Duration,
    retry: RetryPolicy,
}

impl Refresher {
    /// Build a new refresher.
    pub fn builder() -> RefresherBuilder {
        RefresherBuilder::default()
    }

    /// The store this refresher feeds.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// A read handle observing credential swaps.
    pub fn watch(&self) -> CredentialsWatch {
        self.store.subscribe()
    }

    /// The latest credential snapshot.
    pub fn credentials(&self) -> Arc<Credentials> {
        self.store.current()
    }

    /// Fetch the latest secret and install it if it differs from the
    /// current snapshot.
    pub async fn refresh(&self) -> Result<Refresh, RefreshError> {
        let secret = self.source.fetch().await.map_err(RefreshError::Fetch)?;
        if secret.reveal().is_empty() {
            return Err(RefreshError::EmptySecret);
        }

        match self.store.rotate_secret(secret) {
            Some(epoch) => {
                info!(%epoch, "rotated credentials");
                Ok(Refresh::Rotated(epoch))
            }
            None => {
                debug!("fetched secret is unchanged");
                Ok(Refresh::Unchanged)
            }
        }
    }

    /// Run the refresh loop until the token is cancelled.
    ///
    /// Ticks at the configured interval. A tick that still fails after the
    /// retry budget is logged and dropped; the store keeps serving the last
    /// good snapshot until the next tick.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            // The first tick completes immediately; the bootstrap secret is
            // already installed, so skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("refresh loop stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                if let Err(error) = self.refresh_with_retry(&token).await {
                    warn!(%error, "refresh failed, keeping current credentials");
                }
            }
        })
    }

    async fn refresh_with_retry(&self, token: &CancellationToken) -> Result<Refresh, RefreshError> {
        let mut attempt = 0;
        loop {
            match self.refresh().await {
                Ok(refresh) => return Ok(refresh),
                Err(error) => {
                    if attempt + 1 >= self.retry.max_attempts {
                        return Err(error);
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "secret fetch failed, retrying"
                    );
                    tokio::select! {
                        _ = token.cancelled() => return Err(error),
                        _ = time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

/// Builder struct for [Refresher].
#[derive(Debug, Default)]
pub struct RefresherBuilder {
    endpoint: Option<Url>,
    principal: Option<String>,
    source: Option<Arc<dyn SecretSource + Send + Sync>>,
    initial_secret: Option<Secret>,
    interval: Option<Duration>,
    retry: RetryPolicy,
}

impl RefresherBuilder {
    /// Build the refresher.
    ///
    /// Bootstraps the store by fetching a secret from the source, unless one
    /// was supplied with [with_initial_secret](Self::with_initial_secret).
    pub async fn build(self) -> Result<Refresher> {
        let Self {
            endpoint,
            principal,
            source,
            initial_secret,
            interval,
            retry,
        } = self;

        let Some(endpoint) = endpoint else {
            bail!("endpoint is required, see `with_endpoint`")
        };

        let Some(principal) = principal else {
            bail!("principal is required, see `with_principal`")
        };

        let Some(source) = source else {
            bail!("secret source is required, see `with_source`")
        };

        let secret = match initial_secret {
            Some(secret) => secret,
            None => source
                .fetch()
                .await
                .context("failed to fetch bootstrap secret")?,
        };
        if secret.reveal().is_empty() {
            bail!("bootstrap secret is empty")
        }

        let store = Arc::new(CredentialStore::new(Credentials::new(
            endpoint, principal, secret,
        )));

        Ok(Refresher {
            store,
            source,
            interval: interval.unwrap_or(DEFAULT_REFRESH_INTERVAL),
            retry,
        })
    }

    /// Set the base URL of the external resource the credentials are for.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set the principal presented to the resource.
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Set the [SecretSource] that new secrets are fetched from.
    pub fn with_source(mut self, source: Arc<dyn SecretSource + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Seed the store without a bootstrap fetch.
    pub fn with_initial_secret(mut self, secret: Secret) -> Self {
        self.initial_secret = Some(secret);
        self
    }

    /// Set the interval between background refreshes.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Set the backoff policy for failed fetches.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Populate endpoint, principal, source, interval and retry policy from
    /// a [RotationConfig].
    pub fn with_config(self, config: &RotationConfig) -> Result<Self> {
        let source = HttpSecretSource::new(config.secret_url.clone())
            .context("unable to build secret source")?;
        Ok(self
            .with_endpoint((*config.endpoint).clone())
            .with_principal(config.principal.clone())
            .with_source(Arc::new(source))
            .with_interval(config.refresh_interval())
            .with_retry_policy(config.retry_policy()))
    }
}
