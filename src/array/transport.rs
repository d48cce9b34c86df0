//! HTTP Transport
//!
//! reqwest-backed access to an array's management REST endpoint.

use crate::config::ExporterConfig;
use crate::domain::ports::{
    ArrayCredentials, ArrayId, ArrayTransport, TransportFactory, TransportResponse,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const AUTH_COMMAND: &str = "auth";
const HEADER_USERNAME: &str = "X-Auth-Username";
const HEADER_PASSWORD: &str = "X-Auth-Password";
const HEADER_TOKEN: &str = "X-Auth-Token";

/// Transport for one array at `https://<host>:<port>/rest`
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(host: &str, config: &ExporterConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: format!("https://{}:{}/rest", host, config.rest_port),
        })
    }

    /// Full URL for a command; path segments after the verb are percent-encoded
    pub fn command_url(&self, command: &str) -> String {
        let mut parts = command.split('/');
        let verb = parts.next().unwrap_or_default();
        let mut url = format!("{}/{}", self.base_url, verb);
        for segment in parts {
            url.push('/');
            url.push_str(&urlencoding::encode(segment));
        }
        url
    }

    async fn read(response: reqwest::Response) -> Result<TransportResponse> {
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(TransportResponse::new(status, body))
    }
}

#[async_trait]
impl ArrayTransport for HttpTransport {
    async fn authenticate(&self, credentials: &ArrayCredentials) -> Result<TransportResponse> {
        debug!(endpoint = %self.base_url, user = %credentials.username, "Requesting array token");
        let response = self
            .client
            .post(self.command_url(AUTH_COMMAND))
            .header(HEADER_USERNAME, &credentials.username)
            .header(HEADER_PASSWORD, &credentials.password)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn post(&self, command: &str, token: &str) -> Result<TransportResponse> {
        let response = self
            .client
            .post(self.command_url(command))
            .header(HEADER_TOKEN, token)
            .json(&serde_json::json!({ "bytes": true }))
            .send()
            .await?;
        Self::read(response).await
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

/// Builds an [`HttpTransport`] per array from shared settings
#[derive(Debug, Clone, Default)]
pub struct HttpTransportFactory {
    config: ExporterConfig,
}

impl HttpTransportFactory {
    pub fn new(config: ExporterConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(
        &self,
        array: &ArrayId,
        credentials: &ArrayCredentials,
    ) -> Result<Arc<dyn ArrayTransport>> {
        let transport = HttpTransport::new(&credentials.host, &self.config)?;
        debug!(array = %array, endpoint = %transport.endpoint(), "Created array transport");
        Ok(Arc::new(transport))
    }
}
