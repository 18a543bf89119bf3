use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    chat::FunctionDefinition,
    error::{Error, Result},
    image::{ImageResolver, ProductCard},
    vector::Retrieve,
};

/// What a function hands back: the text for the function turn, and optionally a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionOutput {
    pub content: String,
    pub card: Option<ProductCard>,
}

/// A function the chat model may call.
#[async_trait]
pub trait Function: Send + Sync {
    fn definition(&self) -> FunctionDefinition;

    async fn call(&self, arguments: Value) -> Result<FunctionOutput>;
}

/// Name → (schema, handler). Dispatch is a lookup, never a branch on the name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: Vec<(FunctionDefinition, Arc<dyn Function>)>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function`, replacing any earlier one with the same name.
    pub fn register(mut self, function: impl Function + 'static) -> Self {
        let definition = function.definition();
        self.entries.retain(|(d, _)| d.name != definition.name);
        self.entries.push((definition, Arc::new(function)));
        self
    }

    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.entries.iter().map(|(d, _)| d.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.entries
            .iter()
            .find(|(d, _)| d.name == name)
            .map(|(_, f)| f.clone())
    }
}

/// Deserializes a function's arguments, reporting failures against the function's name.
pub fn parse_arguments<T: DeserializeOwned>(function: &str, arguments: Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|source| Error::InvalidArgument {
        function: function.to_string(),
        source,
    })
}

pub const GET_INFORMATION: &str = "get_information";

#[derive(Deserialize)]
struct GetInformationArgs {
    user_question: String,
}

/// Looks the question up in the exhibit index and turns the hit into a card.
pub struct GetInformation {
    pub retriever: Arc<dyn Retrieve>,
    pub images: Arc<dyn ImageResolver>,
}

#[async_trait]
impl Function for GetInformation {
    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: GET_INFORMATION.to_string(),
            description: "Find exhibition information relevant to the user's question. \
                Only use this when the requested information is not already in the conversation."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "user_question": {
                        "type": "string",
                        "description": "The user's question, e.g. \"Tell me about the exhibition\"",
                    },
                },
                "required": ["user_question"],
            }),
        }
    }

    #[instrument(skip_all)]
    async fn call(&self, arguments: Value) -> Result<FunctionOutput> {
        let args: GetInformationArgs = parse_arguments(GET_INFORMATION, arguments)?;
        let result = self.retriever.retrieve(&args.user_question).await?;

        let image_url = match &result.image_ref {
            Some(image_ref) => self.images.resolve(image_ref).await?,
            None => None,
        };

        Ok(FunctionOutput {
            card: Some(ProductCard {
                content: result.content.clone(),
                image_url,
            }),
            content: result.content,
        })
    }
}
