use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chat::{ChatClient, Turn};
use config::Config;
use embeddings::EmbeddingClient;
use functions::{FunctionRegistry, GetInformation};
use language::LanguageClient;
use orchestrator::{Exchange, Orchestrator};
use vector::{Retriever, VectorDbClient};

pub mod api;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod daemon;
pub mod embeddings;
pub mod error;
pub mod functions;
pub mod image;
pub mod language;
pub mod orchestrator;
pub mod storage;
pub mod vector;

pub use error::{Error, Result};

/// A client that runs every operation in-process against the configured services.
/// Clones are reference counted.
#[non_exhaustive]
#[derive(Clone)]
pub struct LocalClient {
    pub language: LanguageClient,
    pub orchestrator: Orchestrator,
}

impl LocalClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = config.http_client()?;

        let language = LanguageClient::new(config, http.clone())
            .context("failed to create language client")?;
        let chat = ChatClient::new(config, http.clone()).context("failed to create chat client")?;
        let retriever = Retriever {
            embeddings: EmbeddingClient::new(config, http.clone())
                .context("failed to create embeddings client")?,
            vector: VectorDbClient::new(config, http.clone())
                .context("failed to create search client")?,
        };
        let images =
            image::resolver(&config.image, http).context("failed to create image resolver")?;

        let functions = FunctionRegistry::new().register(GetInformation {
            retriever: Arc::new(retriever),
            images,
        });
        let orchestrator = Orchestrator::new(Arc::new(chat), functions)
            .with_reply_guidance(config.reply_guidance.clone());

        Ok(Self {
            language,
            orchestrator,
        })
    }

    pub async fn detect_language(&self, text: &str) -> Result<&'static str> {
        self.language.detect_voice_locale(text).await
    }

    pub async fn message(&self, transcript: Vec<Turn>) -> Result<Exchange> {
        self.orchestrator.handle(transcript).await
    }

    /// Runs the client as a daemon serving over REST
    pub async fn daemonize(self, host: &str, port: u16) -> anyhow::Result<()> {
        daemon::run(self, host, port).await
    }
}

#[async_trait(?Send)]
impl api::ClientApi for LocalClient {
    async fn detect_language(&self, text: &str) -> anyhow::Result<String> {
        Ok(LocalClient::detect_language(self, text).await?.to_string())
    }

    async fn message(&self, transcript: Vec<Turn>) -> anyhow::Result<Exchange> {
        Ok(LocalClient::message(self, transcript).await?)
    }
}
