use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::ImagePolicy,
    error::Result,
    storage::StorageClient,
};

/// What the avatar page shows next to a retrieved answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCard {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Maps an image reference from the search index to a url the browser can load.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    /// `None` means the card is shown without an image.
    async fn resolve(&self, image_ref: &str) -> Result<Option<String>>;
}

/// Base url + image reference.
#[derive(Debug, Clone)]
pub struct PublicUrl {
    pub base_url: String,
}

impl PublicUrl {
    pub fn url(&self, image_ref: &str) -> String {
        format!("{}{}", self.base_url, image_ref)
    }
}

#[async_trait]
impl ImageResolver for PublicUrl {
    async fn resolve(&self, image_ref: &str) -> Result<Option<String>> {
        Ok(Some(self.url(image_ref)))
    }
}

/// One-hour read-only SAS url, dropped when the blob does not answer a probe.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub storage: StorageClient,
}

#[async_trait]
impl ImageResolver for SignedUrl {
    async fn resolve(&self, image_ref: &str) -> Result<Option<String>> {
        let url = self.storage.signed_url(image_ref, Utc::now())?;
        if self.storage.is_reachable(&url).await {
            Ok(Some(url))
        } else {
            debug!(image_ref, "image not reachable, card sent without it");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoImage;

#[async_trait]
impl ImageResolver for NoImage {
    async fn resolve(&self, _image_ref: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

pub fn resolver(policy: &ImagePolicy, client: Client) -> Result<Arc<dyn ImageResolver>> {
    Ok(match policy {
        ImagePolicy::Public { base_url } => Arc::new(PublicUrl {
            base_url: base_url.clone(),
        }),
        ImagePolicy::Signed(blob) => Arc::new(SignedUrl {
            storage: StorageClient::new(blob, client)?,
        }),
        ImagePolicy::None => Arc::new(NoImage),
    })
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::config::BlobConfig;

    #[tokio::test]
    async fn public_url_is_plain_concatenation() {
        let public = PublicUrl {
            base_url: "https://images.example/exhibits/".into(),
        };
        let first = public.resolve("wafer.png").await.unwrap();
        let second = public.resolve("wafer.png").await.unwrap();
        assert_eq!(first.as_deref(), Some("https://images.example/exhibits/wafer.png"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn no_image_policy_never_yields_a_url() {
        assert_eq!(NoImage.resolve("wafer.png").await.unwrap(), None);
    }

    #[tokio::test]
    async fn signed_url_drops_unreachable_images() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/exhibits/wafer.png"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/exhibits/gone.png"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let policy = ImagePolicy::Signed(BlobConfig {
            account: "avatarimages".into(),
            key: "YXZhdGFyLXRlc3QtYWNjb3VudC1rZXk=".into(),
            container: "exhibits".into(),
            endpoint: server.uri(),
        });
        let resolver = resolver(&policy, Client::new()).unwrap();

        let url = resolver.resolve("wafer.png").await.unwrap().unwrap();
        assert!(url.starts_with(&format!("{}/exhibits/wafer.png?", server.uri())));
        assert!(url.contains("sig="));
        assert_eq!(resolver.resolve("gone.png").await.unwrap(), None);
    }
}
