use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::refresher::retry::RetryPolicy;

/// Configuration for one rotating credential setup.
///
/// Optional fields take defaults tuned for an hourly rotation cadence.
#[derive(Deserialize, Debug, Clone)]
pub struct RotationConfig {
    /// Base URL of the external resource to connect to.
    pub endpoint: BaseUrl,
    /// Principal presented to the resource.
    pub principal: String,
    /// URL serving the current secret as a plaintext body.
    pub secret_url: Url,
    /// Seconds between background refreshes.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Base delay between fetch retries, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Hard cap on the computed retry delay, in seconds.
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_seconds: u64,
    /// Fetch attempts per refresh before waiting for the next tick.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    /// Idle connections the pool keeps for reuse.
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
}

impl RotationConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_secs(self.retry_max_delay_seconds),
            jitter: true,
        }
    }
}

fn default_refresh_interval() -> u64 {
    3600
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay() -> u64 {
    60
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_max_idle() -> usize {
    8
}

/// A url that is always a base (can be safely join()'ed with further path elements without
/// mangling).
#[derive(Deserialize, Debug, Clone, Hash, PartialEq, Eq)]
#[serde(try_from = "String")]
pub struct BaseUrl(Url);

impl std::ops::Deref for BaseUrl {
    type Target = Url;

    fn deref(&self) -> &Url {
        &self.0
    }
}

impl From<BaseUrl> for Url {
    fn from(base: BaseUrl) -> Url {
        base.0
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = url::ParseError;

    fn try_from(mut url: String) -> Result<Self, Self::Error> {
        // Make URL a base.
        if !url.ends_with('/') {
            url += "/"
        }
        url.parse().map(Self)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimal_config_takes_defaults() {
        let json = r#"{
            "endpoint": "postgres://db.example.com",
            "principal": "app_rw",
            "secret_url": "https://secrets.example.com/db/app_rw"
        }"#;
        let config: RotationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.refresh_interval_seconds, 3600);
        assert_eq!(config.retry_base_delay_ms, 500);
        assert_eq!(config.retry_max_delay_seconds, 60);
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.max_idle, 8);
        assert_eq!(config.refresh_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let json = r#"{
            "endpoint": "postgres://db.example.com",
            "principal": "app_rw",
            "secret_url": "https://secrets.example.com/db/app_rw",
            "refresh_interval_seconds": 300,
            "retry_max_attempts": 2,
            "max_idle": 1
        }"#;
        let config: RotationConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.refresh_interval_seconds, 300);
        assert_eq!(config.retry_policy().max_attempts, 2);
        assert_eq!(config.max_idle, 1);
    }

    #[test]
    fn endpoint_is_a_base() {
        let json = r#"{
            "endpoint": "https://api.example.com/v1",
            "principal": "app_rw",
            "secret_url": "https://secrets.example.com/api"
        }"#;
        let config: RotationConfig = serde_json::from_str(json).unwrap();

        let joined = config.endpoint.join("sessions").unwrap();
        assert_eq!("https://api.example.com/v1/sessions", joined.as_str());
    }
}
