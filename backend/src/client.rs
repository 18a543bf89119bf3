use anyhow::*;
use async_trait::async_trait;
use reqwest::Client;

use crate::{
    api::{ClientApi, Exchange},
    chat::Turn,
};

/// A client that talks to a running daemon over its REST interface.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    base_url: String,
    client: Client,
}

impl RemoteClient {
    pub fn new(url: &str) -> Self {
        Self {
            base_url: url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        bail!("daemon responded with {status}: {body}")
    }
}

#[async_trait(?Send)]
impl ClientApi for RemoteClient {
    async fn detect_language(&self, text: &str) -> Result<String> {
        let resp = self
            .client
            .get(format!("{}/api/detectLanguage", self.base_url))
            .query(&[("text", text)])
            .send()
            .await
            .context("failed to reach daemon")?;

        Self::checked(resp)
            .await?
            .text()
            .await
            .context("failed to read detected locale")
    }

    async fn message(&self, transcript: Vec<Turn>) -> Result<Exchange> {
        let resp = self
            .client
            .post(format!("{}/api/message", self.base_url))
            .json(&transcript)
            .send()
            .await
            .context("failed to reach daemon")?;

        Self::checked(resp)
            .await?
            .json()
            .await
            .context("daemon returned an invalid exchange")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[tokio::test]
    async fn detect_language_reads_plain_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/detectLanguage"))
            .and(query_param("text", "guten Tag"))
            .respond_with(ResponseTemplate::new(200).set_body_string("de-DE"))
            .mount(&server)
            .await;

        let locale = RemoteClient::new(&format!("{}/", server.uri()))
            .detect_language("guten Tag")
            .await
            .unwrap();
        assert_eq!(locale, "de-DE");
    }

    #[tokio::test]
    async fn message_round_trips_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/message"))
            .and(body_json(json!([{ "role": "user", "content": "hi" }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [
                    { "role": "user", "content": "hi" },
                    { "role": "assistant", "content": "hello" }
                ],
                "products": []
            })))
            .mount(&server)
            .await;

        let exchange = RemoteClient::new(&server.uri())
            .message(vec![Turn::user("hi")])
            .await
            .unwrap();
        assert_eq!(exchange.messages.last(), Some(&Turn::assistant("hello")));
        assert!(exchange.products.is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Please pass a text"))
            .mount(&server)
            .await;

        let err = RemoteClient::new(&server.uri())
            .detect_language("")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("400"));
    }
}
