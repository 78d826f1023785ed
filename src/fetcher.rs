use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::config::Config;
use crate::models::Post;

/// Every way fetching the collection can fail
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
    #[error("request failed")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response status: {0}")]
    Status(StatusCode),
    #[error("malformed post collection")]
    Decode(#[from] serde_json::Error),
}

/// Something that can hand over the full post collection in one call
pub trait PostSource: Send + Sync {
    fn fetch_posts(&self) -> BoxFuture<'_, Result<Vec<Post>, FetchError>>;
}

/// Fetches the whole collection with a single GET to a fixed URL
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::Client)?;

        Ok(Self {
            client,
            url: config.endpoint.clone(),
        })
    }

    async fn fetch(&self) -> Result<Vec<Post>, FetchError> {
        let response = self.client.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let bytes = response.bytes().await?;
        let posts: Vec<Post> = serde_json::from_slice(&bytes)?;

        debug!(url = %self.url, count = posts.len(), "fetched post collection");
        Ok(posts)
    }
}

impl PostSource for HttpSource {
    fn fetch_posts(&self) -> BoxFuture<'_, Result<Vec<Post>, FetchError>> {
        self.fetch().boxed()
    }
}
