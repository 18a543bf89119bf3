use std::{fmt, time::Duration};

use anyhow::{bail, Context, Result};

use crate::auth::{AppRegistration, AuthMode};

const DEFAULT_SEARCH_API_VERSION: &str = "2023-07-01-Preview";
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Process-wide configuration. Loaded once at startup and only ever borrowed afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub http_timeout: Duration,
    pub auth: AuthMode,
    pub language: LanguageConfig,
    pub openai: OpenAiConfig,
    pub search: SearchConfig,
    pub image: ImagePolicy,
    /// Extra system turn appended before the function turns, if set.
    pub reply_guidance: Option<String>,
}

#[derive(Clone)]
pub struct LanguageConfig {
    pub endpoint: String,
    pub key: Option<String>,
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub key: Option<String>,
    pub api_version: String,
    pub chat_deployment: String,
    pub embeddings_deployment: String,
}

#[derive(Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub key: Option<String>,
    pub index: String,
    pub api_version: String,
    pub vector_field: String,
    pub image_field: String,
}

/// How an image reference returned by the search index becomes a URL.
#[derive(Debug, Clone)]
pub enum ImagePolicy {
    /// `base_url` + image reference.
    Public { base_url: String },
    /// Short-lived read-only SAS url, probed before use.
    Signed(BlobConfig),
    /// Cards carry content only.
    None,
}

#[derive(Clone)]
pub struct BlobConfig {
    pub account: String,
    pub key: String,
    pub container: String,
    pub endpoint: String,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let vars = Vars(&lookup);

        let auth = match vars.or("AUTH_MODE", "key").to_ascii_lowercase().as_str() {
            "key" => AuthMode::Key,
            "app" => AuthMode::App(AppRegistration {
                tenant_id: vars.required("AZURE_TENANT_ID")?,
                client_id: vars.required("AZURE_CLIENT_ID")?,
                client_secret: vars.required("AZURE_CLIENT_SECRET")?,
                authority_host: vars.or("AZURE_AUTHORITY_HOST", DEFAULT_AUTHORITY_HOST),
            }),
            other => bail!("AUTH_MODE must be `key` or `app`, got `{other}`"),
        };
        // keys are only mandatory when they are the credential
        let key = |name: &str| -> Result<Option<String>> {
            match &auth {
                AuthMode::Key => vars.required(name).map(Some),
                AuthMode::App(_) => Ok(vars.get(name)),
            }
        };

        let language = LanguageConfig {
            endpoint: vars.required("TEXT_ANALYTICS_ENDPOINT")?,
            key: key("TEXT_ANALYTICS_KEY")?,
        };

        let openai = OpenAiConfig {
            endpoint: vars.required("AZURE_OPENAI_ENDPOINT")?,
            key: key("AZURE_OPENAI_API_KEY")?,
            api_version: vars.required("AZURE_OPENAI_API_VERSION")?,
            chat_deployment: vars.required("AZURE_OPENAI_CHAT_DEPLOYMENT")?,
            embeddings_deployment: vars.required("AZURE_OPENAI_EMBEDDINGS_DEPLOYMENT")?,
        };

        let search = SearchConfig {
            endpoint: vars.required("AZURE_SEARCH_ENDPOINT")?,
            key: key("AZURE_SEARCH_API_KEY")?,
            index: vars.required("AZURE_SEARCH_INDEX")?,
            api_version: vars.or("AZURE_SEARCH_API_VERSION", DEFAULT_SEARCH_API_VERSION),
            vector_field: vars.or("AZURE_SEARCH_VECTOR_FIELD", "content_vector"),
            image_field: vars.or("AZURE_SEARCH_IMAGE_FIELD", "product_image_file"),
        };

        let image = match vars.or("IMAGE_POLICY", "public").to_ascii_lowercase().as_str() {
            "public" => ImagePolicy::Public {
                base_url: vars.required("IMAGE_BASE_URL")?,
            },
            "signed" => {
                let account = vars.required("BLOB_ACCOUNT_NAME")?;
                ImagePolicy::Signed(BlobConfig {
                    endpoint: vars
                        .get("BLOB_ENDPOINT")
                        .unwrap_or_else(|| format!("https://{account}.blob.core.windows.net")),
                    key: vars.required("BLOB_ACCOUNT_KEY")?,
                    container: vars.required("BLOB_CONTAINER")?,
                    account,
                })
            }
            "none" => ImagePolicy::None,
            other => bail!("IMAGE_POLICY must be `public`, `signed` or `none`, got `{other}`"),
        };

        let port: u16 = vars
            .or("PORT", "7071")
            .parse()
            .context("PORT is not a valid port number")?;
        let timeout_secs: u64 = vars
            .or("HTTP_TIMEOUT_SECS", "30")
            .parse()
            .context("HTTP_TIMEOUT_SECS is not a number of seconds")?;

        Ok(Self {
            host: vars.or("HOST", "0.0.0.0"),
            port,
            http_timeout: Duration::from_secs(timeout_secs),
            auth,
            language,
            openai,
            search,
            image,
            reply_guidance: vars.get("REPLY_GUIDANCE"),
        })
    }

    /// Shared HTTP client with the configured timeout applied to every outbound call.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .build()
            .context("failed to build http client")
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.get(name)
            .with_context(|| format!("{name} env variable not set"))
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }
}

fn redacted(key: &Option<String>) -> &'static str {
    match key {
        Some(_) => "<redacted>",
        None => "<unset>",
    }
}

impl fmt::Debug for LanguageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LanguageConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &redacted(&self.key))
            .finish()
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &redacted(&self.key))
            .field("api_version", &self.api_version)
            .field("chat_deployment", &self.chat_deployment)
            .field("embeddings_deployment", &self.embeddings_deployment)
            .finish()
    }
}

impl fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchConfig")
            .field("endpoint", &self.endpoint)
            .field("key", &redacted(&self.key))
            .field("index", &self.index)
            .field("api_version", &self.api_version)
            .field("vector_field", &self.vector_field)
            .field("image_field", &self.image_field)
            .finish()
    }
}

impl fmt::Debug for BlobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobConfig")
            .field("account", &self.account)
            .field("key", &"<redacted>")
            .field("container", &self.container)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}
