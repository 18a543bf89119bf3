use reqwest::Client;
use serde_json::{from_value, json, Value};
use tracing::instrument;

use crate::{
    auth::{Credential, API_KEY_HEADER, COGNITIVE_SERVICES_SCOPE},
    config::Config,
    error::{send_json, Error, Result},
};

const SERVICE: &str = "embeddings";

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    url: String,
    credential: Credential,
    client: Client,
}

impl EmbeddingClient {
    pub fn new(config: &Config, client: Client) -> Result<Self> {
        let openai = &config.openai;
        Ok(Self {
            url: format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                openai.endpoint.trim_end_matches('/'),
                openai.embeddings_deployment,
                openai.api_version
            ),
            credential: Credential::new(
                &config.auth,
                API_KEY_HEADER,
                openai.key.as_deref(),
                COGNITIVE_SERVICES_SCOPE,
            )?,
            client,
        })
    }

    /// Embeds a single input string.
    #[instrument(skip_all)]
    pub async fn generate(&self, input: &str) -> Result<Vec<f32>> {
        let request = self
            .client
            .post(&self.url)
            .json(&json!({ "input": input }));
        let request = self.credential.authorize(&self.client, request).await?;

        let mut resp: Value = send_json(SERVICE, request).await?;

        if resp["data"].as_array().is_some_and(|data| data.is_empty()) {
            return Err(Error::EmptyResponse { service: SERVICE });
        }
        let Some(embedding) = resp.pointer_mut("/data/0/embedding") else {
            return Err(Error::malformed(SERVICE, "missing `data[0].embedding`"));
        };

        from_value(embedding.take()).map_err(|e| Error::malformed(SERVICE, e))
    }
}
