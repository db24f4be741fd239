use anyhow::{Context, Result};
use async_trait::async_trait;
use http::{Request, Response};

/// Generic HTTP client used to reach the secret endpoint.
///
/// A trait is used here so that applications with their own HTTP/TLS stack
/// (or a native client on mobile targets) can substitute one.
#[async_trait]
pub trait AsyncHttpClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .context("failed to extract response body")?
            .to_vec();

        let mut builder = Response::builder().status(status);
        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(headers);
        builder.body(body).context("unable to construct response")
    }
}

#[cfg(test)]
mod test {
    use http::Response;

    #[test]
    fn debug() {
        Response::builder().headers_mut().unwrap();
    }
}
