use std::fmt;

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{send_json, Error, Result};

pub const API_KEY_HEADER: &str = "api-key";
pub const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";
pub const SEARCH_SCOPE: &str = "https://search.azure.com/.default";

/// Which credential every outbound call is made with.
#[derive(Debug, Clone)]
pub enum AuthMode {
    Key,
    App(AppRegistration),
}

/// An Entra ID app registration used with the client-credentials grant.
#[derive(Clone)]
pub struct AppRegistration {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authority_host: String,
}

impl fmt::Debug for AppRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppRegistration")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

/// The credential for one upstream service.
#[derive(Clone)]
pub enum Credential {
    Key {
        header: &'static str,
        key: String,
    },
    App {
        registration: AppRegistration,
        scope: &'static str,
    },
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl Credential {
    /// Picks the credential for a service. `key` is only consulted in key mode.
    pub fn new(
        mode: &AuthMode,
        header: &'static str,
        key: Option<&str>,
        scope: &'static str,
    ) -> Result<Self> {
        match mode {
            AuthMode::Key => Ok(Credential::Key {
                header,
                key: key
                    .ok_or_else(|| Error::Auth(format!("no key configured for `{header}`")))?
                    .to_string(),
            }),
            AuthMode::App(registration) => Ok(Credential::App {
                registration: registration.clone(),
                scope,
            }),
        }
    }

    /// Attaches the credential to `request`. In app mode a fresh token is fetched each time.
    pub async fn authorize(&self, http: &Client, request: RequestBuilder) -> Result<RequestBuilder> {
        match self {
            Credential::Key { header, key } => Ok(request.header(*header, key)),
            Credential::App {
                registration,
                scope,
            } => {
                let token = fetch_token(http, registration, scope).await?;
                Ok(request.bearer_auth(token))
            }
        }
    }
}

#[instrument(skip_all, fields(scope = %scope))]
async fn fetch_token(http: &Client, app: &AppRegistration, scope: &str) -> Result<String> {
    let url = format!(
        "{}/{}/oauth2/v2.0/token",
        app.authority_host.trim_end_matches('/'),
        app.tenant_id
    );
    let request = http.post(url).form(&[
        ("grant_type", "client_credentials"),
        ("client_id", app.client_id.as_str()),
        ("client_secret", app.client_secret.as_str()),
        ("scope", scope),
    ]);

    let token: TokenResponse = send_json("identity", request)
        .await
        .map_err(|e| Error::Auth(e.to_string()))?;
    debug!("acquired access token");
    Ok(token.access_token)
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Key { header, .. } => f
                .debug_struct("Key")
                .field("header", header)
                .field("key", &"<redacted>")
                .finish(),
            Credential::App {
                registration,
                scope,
            } => f
                .debug_struct("App")
                .field("registration", registration)
                .field("scope", scope)
                .finish(),
        }
    }
}
