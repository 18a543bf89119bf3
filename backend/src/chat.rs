use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    auth::{Credential, API_KEY_HEADER, COGNITIVE_SERVICES_SCOPE},
    config::Config,
    error::{send_json, Error, Result},
};

const SERVICE: &str = "chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

/// A model's request to invoke a registered function. `arguments` is JSON encoded as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// One entry of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    /// Function name, set on function results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Records that the model asked for `call`; content stays empty.
    pub fn function_call(role: Role, call: FunctionCall) -> Self {
        Self {
            role,
            content: None,
            name: None,
            function_call: Some(call),
        }
    }

    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: Some(content.into()),
            name: Some(name.into()),
            function_call: None,
        }
    }

    /// The reply as it is kept in the transcript: role and content only.
    pub fn into_reply(self) -> Self {
        Self {
            role: self.role,
            content: self.content,
            name: None,
            function_call: None,
        }
    }
}

/// A function advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Whether the model may answer with a function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionCallMode {
    Auto,
    None,
}

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Returns the first choice's message.
    async fn complete(
        &self,
        messages: &[Turn],
        functions: &[FunctionDefinition],
        mode: FunctionCallMode,
    ) -> Result<Turn>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [Turn],
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<&'a [FunctionDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallMode>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Turn,
}

#[derive(Debug, Clone)]
pub struct ChatClient {
    url: String,
    credential: Credential,
    client: Client,
}

impl ChatClient {
    pub fn new(config: &Config, client: Client) -> Result<Self> {
        let openai = &config.openai;
        Ok(Self {
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                openai.endpoint.trim_end_matches('/'),
                openai.chat_deployment,
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
}

#[async_trait]
impl ChatApi for ChatClient {
    #[instrument(skip_all, fields(turns = messages.len(), mode = ?mode))]
    async fn complete(
        &self,
        messages: &[Turn],
        functions: &[FunctionDefinition],
        mode: FunctionCallMode,
    ) -> Result<Turn> {
        let body = ChatCompletionRequest {
            messages,
            // the service rejects `function_call` without `functions`
            functions: (!functions.is_empty()).then_some(functions),
            function_call: (!functions.is_empty()).then_some(mode),
            temperature: 0.0,
        };
        let request = self.client.post(&self.url).json(&body);
        let request = self.credential.authorize(&self.client, request).await?;

        let resp: ChatCompletionResponse = send_json(SERVICE, request).await?;
        let message = resp
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or(Error::EmptyResponse { service: SERVICE })?;

        debug!(function_call = message.function_call.is_some(), "chat completion");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::config::tests::base_vars;

    async fn client_for(server: &MockServer) -> ChatClient {
        let mut vars = base_vars();
        vars.insert("AZURE_OPENAI_ENDPOINT", server.uri());
        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
        ChatClient::new(&config, Client::new()).unwrap()
    }

    fn lookup_function() -> FunctionDefinition {
        FunctionDefinition {
            name: "get_information".into(),
            description: "Looks things up.".into(),
            parameters: json!({ "type": "object", "properties": {} }),
        }
    }

    #[test]
    fn turns_use_the_wire_shape() {
        let call = Turn::function_call(
            Role::Assistant,
            FunctionCall {
                name: "get_information".into(),
                arguments: r#"{"user_question":"hi"}"#.into(),
            },
        );
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({
                "role": "assistant",
                "content": null,
                "function_call": { "name": "get_information", "arguments": "{\"user_question\":\"hi\"}" }
            })
        );
        assert_eq!(
            serde_json::to_value(Turn::function_result("get_information", "doc")).unwrap(),
            json!({ "role": "function", "name": "get_information", "content": "doc" })
        );
    }

    #[test]
    fn turn_without_content_deserializes() {
        let turn: Turn = serde_json::from_value(json!({ "role": "assistant" })).unwrap();
        assert_eq!(turn.content, None);
        assert!(serde_json::from_value::<Turn>(json!({ "role": "narrator", "content": "x" })).is_err());
    }

    #[tokio::test]
    async fn sends_functions_and_mode_at_zero_temperature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-35-turbo/chat/completions"))
            .and(header("api-key", "openai-key"))
            .and(body_partial_json(json!({
                "messages": [{ "role": "user", "content": "hello" }],
                "functions": [{ "name": "get_information" }],
                "function_call": "auto",
                "temperature": 0.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "finish_reason": "stop",
                    "message": { "role": "assistant", "content": "Hi there." }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .await
            .complete(
                &[Turn::user("hello")],
                &[lookup_function()],
                FunctionCallMode::Auto,
            )
            .await
            .unwrap();
        assert_eq!(reply, Turn::assistant("Hi there."));
    }

    #[tokio::test]
    async fn parses_function_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "function_call": {
                            "name": "get_information",
                            "arguments": "{\"user_question\":\"opening hours\"}"
                        }
                    }
                }]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .await
            .complete(&[Turn::user("hours?")], &[lookup_function()], FunctionCallMode::Auto)
            .await
            .unwrap();
        let call = reply.function_call.unwrap();
        assert_eq!(call.name, "get_information");
        assert_eq!(call.arguments, r#"{"user_question":"opening hours"}"#);
    }

    #[tokio::test]
    async fn no_choices_is_empty_not_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .complete(&[Turn::user("x")], &[], FunctionCallMode::None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn content_filter_error_is_a_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "code": "content_filter" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .complete(&[Turn::user("x")], &[], FunctionCallMode::None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status { status: 400, .. }));
    }
}
