use std::fmt::Debug;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use http::{header::ACCEPT, Request};
use url::Url;

use crate::core::{
    credentials::Secret,
    util::{AsyncHttpClient, ReqwestClient},
};

/// Where new secrets come from.
///
/// Implementations fetch the latest secret for the configured principal. The
/// refresher decides whether the fetched value is actually a rotation.
#[async_trait]
pub trait SecretSource: Debug {
    async fn fetch(&self) -> Result<Secret>;
}

/// A [SecretSource] that issues a GET request and reads the secret from the
/// response body.
///
/// The body is treated as plaintext UTF-8, with surrounding whitespace
/// (usually a trailing newline) trimmed.
#[derive(Debug)]
pub struct HttpSecretSource<H = ReqwestClient> {
    url: Url,
    http_client: H,
}

impl HttpSecretSource {
    pub fn new(url: Url) -> Result<Self> {
        Ok(Self {
            url,
            http_client: ReqwestClient::new()?,
        })
    }
}

impl<H> HttpSecretSource<H> {
    /// Use a custom [AsyncHttpClient] instead of the built-in reqwest one.
    pub fn with_client(url: Url, http_client: H) -> Self {
        Self { url, http_client }
    }
}

#[async_trait]
impl<H: AsyncHttpClient + Debug + Send + Sync> SecretSource for HttpSecretSource<H> {
    async fn fetch(&self) -> Result<Secret> {
        let request = Request::builder()
            .method("GET")
            .uri(self.url.as_str())
            .header(ACCEPT, "text/plain")
            .body(Vec::new())
            .context("failed to construct secret fetch request")?;

        let response = self
            .http_client
            .execute(request)
            .await
            .context("secret fetch request failed")?;

        let status = response.status();
        let Ok(body) = String::from_utf8(response.into_body()) else {
            bail!("secret endpoint returned a non-UTF-8 body (status: {status})")
        };

        if !status.is_success() {
            bail!("secret fetch was unsuccessful (status: {status}): {body}")
        }

        Ok(Secret::new(body.trim()))
    }
}

#[cfg(test)]
mod test {
    use anyhow::Result;
    use async_trait::async_trait;
    use http::{Request, Response, StatusCode};

    use super::*;

    #[derive(Debug)]
    struct CannedClient {
        status: StatusCode,
        body: Vec<u8>,
    }

    #[async_trait]
    impl AsyncHttpClient for CannedClient {
        async fn execute(&self, _request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
            Ok(Response::builder()
                .status(self.status)
                .body(self.body.clone())?)
        }
    }

    fn source(status: StatusCode, body: &[u8]) -> HttpSecretSource<CannedClient> {
        HttpSecretSource::with_client(
            "https://secrets.example.com/db/app_rw".parse().unwrap(),
            CannedClient {
                status,
                body: body.to_vec(),
            },
        )
    }

    #[tokio::test]
    async fn body_is_the_secret() {
        let secret = source(StatusCode::OK, b"hunter2\n").fetch().await.unwrap();
        assert_eq!("hunter2", secret.reveal());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let err = source(StatusCode::FORBIDDEN, b"denied")
            .fetch()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn non_utf8_body_is_an_error() {
        assert!(source(StatusCode::OK, &[0xff, 0xfe]).fetch().await.is_err());
    }
}
