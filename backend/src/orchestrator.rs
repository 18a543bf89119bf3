use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    chat::{ChatApi, FunctionCallMode, Turn},
    error::{Error, Result},
    functions::FunctionRegistry,
    image::ProductCard,
};

/// The answer to one `/api/message` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub messages: Vec<Turn>,
    pub products: Vec<ProductCard>,
}

/// Runs one conversation turn: a chat call, at most one function call, and the final reply.
#[derive(Clone)]
pub struct Orchestrator {
    chat: Arc<dyn ChatApi>,
    functions: FunctionRegistry,
    reply_guidance: Option<String>,
}

impl Orchestrator {
    pub fn new(chat: Arc<dyn ChatApi>, functions: FunctionRegistry) -> Self {
        Self {
            chat,
            functions,
            reply_guidance: None,
        }
    }

    /// Adds a system turn ahead of the function turns, steering the final reply.
    pub fn with_reply_guidance(mut self, guidance: Option<String>) -> Self {
        self.reply_guidance = guidance;
        self
    }

    /// Extends `transcript` with the model's answer. The transcript is not validated;
    /// badly ordered roles are left for the chat service to reject.
    #[instrument(skip_all, fields(turns = transcript.len()))]
    pub async fn handle(&self, mut transcript: Vec<Turn>) -> Result<Exchange> {
        let definitions = self.functions.definitions();

        let reply = self
            .chat
            .complete(&transcript, &definitions, FunctionCallMode::Auto)
            .await?;

        let Some(call) = reply.function_call.clone() else {
            transcript.push(reply.into_reply());
            return Ok(Exchange {
                messages: transcript,
                products: Vec::new(),
            });
        };

        let function = self
            .functions
            .get(&call.name)
            .ok_or_else(|| Error::UnknownFunction(call.name.clone()))?;
        let arguments: Value =
            serde_json::from_str(&call.arguments).map_err(|source| Error::InvalidArgument {
                function: call.name.clone(),
                source,
            })?;
        info!(function = %call.name, "model requested function");

        if let Some(guidance) = &self.reply_guidance {
            transcript.push(Turn::system(guidance.clone()));
        }
        let name = call.name.clone();
        transcript.push(Turn::function_call(reply.role, call));

        let output = function.call(arguments).await?;
        transcript.push(Turn::function_result(name, output.content));

        let reply = self
            .chat
            .complete(&transcript, &definitions, FunctionCallMode::None)
            .await?;
        transcript.push(reply.into_reply());

        Ok(Exchange {
            messages: transcript,
            products: output.card.into_iter().collect(),
        })
    }
}
