//! HTTP client for the Subscription Manager REST API.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use swim_registry::{ApiError, RegistryClient, SubscriptionRecord, TopicRecord};
use tracing::{debug, trace};
use url::Url;

/// Base path of the API unless configured otherwise.
pub const DEFAULT_BASE_PATH: &str = "/subscription-manager/api/1.0";

/// Options for configuring an `HttpRegistryClient`.
#[derive(Clone, Debug)]
pub struct HttpRegistryClientOptions {
    /// Path prefix of the API, e.g. `/subscription-manager/api/1.0`.
    pub base_path: String,

    /// Host (and optional port) of the registry.
    pub host: String,

    /// Use `https` instead of `http`.
    pub https: bool,

    /// Password of the client.
    pub password: String,

    /// Request timeout.
    pub timeout: Duration,

    /// User of the client.
    pub username: String,

    /// Verify the server certificate.
    pub verify: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

/// Registry client speaking JSON over HTTP with basic auth.
#[derive(Clone, Debug)]
pub struct HttpRegistryClient {
    base_url: Url,
    client: Client,
    password: String,
    username: String,
}

impl HttpRegistryClient {
    /// Creates a new `HttpRegistryClient`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(
        HttpRegistryClientOptions {
            base_path,
            host,
            https,
            password,
            timeout,
            username,
            verify,
        }: HttpRegistryClientOptions,
    ) -> Result<Self, Error> {
        let scheme = if https { "https" } else { "http" };
        let base_url = Url::parse(&format!(
            "{scheme}://{host}{}/",
            base_path.trim_end_matches('/')
        ))?;

        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!verify)
            .build()?;

        debug!("registry client for {}", base_url);

        Ok(Self {
            base_url,
            client,
            password,
            username,
        })
    }

    /// Root URL every endpoint is resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::transport(format!("invalid path {path}: {e}")))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))?;

        let status = response.status();
        trace!("registry responded {}", status);

        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.detail)
            .unwrap_or_else(|_| {
                if text.is_empty() {
                    status.canonical_reason().unwrap_or_default().to_string()
                } else {
                    text
                }
            });

        Err(ApiError::new(status, detail))
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        self.execute(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::transport(e.to_string()))
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn ping_credentials(&self) -> Result<(), ApiError> {
        let url = self.url("ping-credentials")?;
        self.execute(self.client.get(url)).await.map(|_| ())
    }

    async fn get_topics(&self) -> Result<Vec<TopicRecord>, ApiError> {
        let url = self.url("topics/")?;
        self.fetch(self.client.get(url)).await
    }

    async fn post_topic(&self, name: &str) -> Result<TopicRecord, ApiError> {
        let url = self.url("topics/")?;
        self.fetch(self.client.post(url).json(&json!({ "name": name })))
            .await
    }

    async fn delete_topic_by_id(&self, topic_id: u64) -> Result<(), ApiError> {
        let url = self.url(&format!("topics/{topic_id}"))?;
        self.execute(self.client.delete(url)).await.map(|_| ())
    }

    async fn post_subscription(&self, topic_id: u64) -> Result<SubscriptionRecord, ApiError> {
        let url = self.url("subscriptions/")?;
        self.fetch(
            self.client
                .post(url)
                .json(&json!({ "topic_id": topic_id })),
        )
        .await
    }

    async fn get_subscriptions(&self, queue: &str) -> Result<Vec<SubscriptionRecord>, ApiError> {
        let url = self.url("subscriptions/")?;
        self.fetch(self.client.get(url).query(&[("queue", queue)]))
            .await
    }

    async fn put_subscription(
        &self,
        subscription_id: u64,
        record: &SubscriptionRecord,
    ) -> Result<SubscriptionRecord, ApiError> {
        let url = self.url(&format!("subscriptions/{subscription_id}"))?;
        self.fetch(self.client.put(url).json(record)).await
    }

    async fn delete_subscription_by_id(&self, subscription_id: u64) -> Result<(), ApiError> {
        let url = self.url(&format!("subscriptions/{subscription_id}"))?;
        self.execute(self.client.delete(url)).await.map(|_| ())
    }
}
