use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use crate::{
    auth::{Credential, API_KEY_HEADER, SEARCH_SCOPE},
    config::Config,
    embeddings::EmbeddingClient,
    error::{send_json, Error, Result},
};

const SERVICE: &str = "search";

/// The single document a question resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalResult {
    pub content: String,
    pub image_ref: Option<String>,
}

/// Turns a free-text question into the closest indexed document.
#[async_trait]
pub trait Retrieve: Send + Sync {
    async fn retrieve(&self, question: &str) -> Result<RetrievalResult>;
}

#[derive(Deserialize)]
struct SearchResponse {
    value: Vec<Map<String, Value>>,
}

/// Nearest-neighbour queries against one search index.
#[derive(Debug, Clone)]
pub struct VectorDbClient {
    url: String,
    credential: Credential,
    vector_field: String,
    image_field: String,
    client: Client,
}

impl VectorDbClient {
    pub fn new(config: &Config, client: Client) -> Result<Self> {
        let search = &config.search;
        Ok(Self {
            url: format!(
                "{}/indexes/{}/docs/search?api-version={}",
                search.endpoint.trim_end_matches('/'),
                search.index,
                search.api_version
            ),
            credential: Credential::new(
                &config.auth,
                API_KEY_HEADER,
                search.key.as_deref(),
                SEARCH_SCOPE,
            )?,
            vector_field: search.vector_field.clone(),
            image_field: search.image_field.clone(),
            client,
        })
    }

    /// Returns the top hit for `vector`, or [`Error::NotFound`] when the index has none.
    #[instrument(skip_all)]
    pub async fn nearest(&self, vector: Vec<f32>) -> Result<RetrievalResult> {
        let request = self.client.post(&self.url).json(&json!({
            "vectors": [{ "value": vector, "fields": self.vector_field, "k": 1 }],
            "select": format!("content, {}", self.image_field),
        }));
        let request = self.credential.authorize(&self.client, request).await?;

        let resp: SearchResponse = send_json(SERVICE, request).await?;
        let mut hit = resp.value.into_iter().next().ok_or(Error::NotFound)?;

        let content = match hit.remove("content") {
            Some(Value::String(content)) => content,
            _ => return Err(Error::malformed(SERVICE, "top hit has no `content`")),
        };
        let image_ref = match hit.remove(&self.image_field) {
            Some(Value::String(image)) if !image.is_empty() => Some(image),
            _ => None,
        };
        debug!(?image_ref, "retrieved document");

        Ok(RetrievalResult { content, image_ref })
    }
}

/// Embeds the question, then asks the index for its single nearest document.
#[derive(Debug, Clone)]
pub struct Retriever {
    pub embeddings: EmbeddingClient,
    pub vector: VectorDbClient,
}

#[async_trait]
impl Retrieve for Retriever {
    #[instrument(skip_all)]
    async fn retrieve(&self, question: &str) -> Result<RetrievalResult> {
        let embedding = self.embeddings.generate(question.trim()).await?;
        self.vector.nearest(embedding).await
    }
}
