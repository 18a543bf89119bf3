use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::{
    auth::{Credential, COGNITIVE_SERVICES_SCOPE, SUBSCRIPTION_KEY_HEADER},
    config::Config,
    error::{send_json, Error, Result},
};

const SERVICE: &str = "language";

/// Voice used when the detected language has no entry in [`VOICE_LOCALES`].
pub const DEFAULT_VOICE_LOCALE: &str = "zh-CN";

/// ISO 639-1 code (as the detector reports it) → text-to-speech locale.
pub const VOICE_LOCALES: &[(&str, &str)] = &[
    ("de", "de-DE"),
    ("en", "en-US"),
    ("es", "es-ES"),
    ("fr", "fr-FR"),
    ("it", "it-IT"),
    ("ja", "ja-JP"),
    ("ko", "ko-KR"),
    ("pt", "pt-BR"),
    ("zh_chs", "zh-CN"),
    ("zh_cht", "zh-CN"),
    ("ar", "ar-AE"),
];

pub fn voice_locale(iso6391: &str) -> &'static str {
    VOICE_LOCALES
        .iter()
        .find(|(code, _)| *code == iso6391)
        .map(|(_, locale)| *locale)
        .unwrap_or(DEFAULT_VOICE_LOCALE)
}

#[derive(Deserialize)]
struct DetectResponse {
    documents: Vec<DetectedDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedDocument {
    detected_language: DetectedLanguage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectedLanguage {
    iso6391_name: String,
}

#[derive(Debug, Clone)]
pub struct LanguageClient {
    url: String,
    credential: Credential,
    client: Client,
}

impl LanguageClient {
    pub fn new(config: &Config, client: Client) -> Result<Self> {
        let language = &config.language;
        Ok(Self {
            url: format!(
                "{}/text/analytics/v3.1/languages",
                language.endpoint.trim_end_matches('/')
            ),
            credential: Credential::new(
                &config.auth,
                SUBSCRIPTION_KEY_HEADER,
                language.key.as_deref(),
                COGNITIVE_SERVICES_SCOPE,
            )?,
            client,
        })
    }

    /// Detects the language of `text` and returns the ISO 639-1 code.
    #[instrument(skip_all)]
    pub async fn detect(&self, text: &str) -> Result<String> {
        if text.is_empty() {
            return Err(Error::MissingInput("text".into()));
        }

        let request = self.client.post(&self.url).json(&json!({
            "documents": [{ "id": "1", "text": text }]
        }));
        let request = self.credential.authorize(&self.client, request).await?;

        let resp: DetectResponse = send_json(SERVICE, request).await?;
        let document = resp
            .documents
            .into_iter()
            .next()
            .ok_or(Error::EmptyResponse { service: SERVICE })?;

        let code = document.detected_language.iso6391_name;
        debug!(%code, "detected language");
        Ok(code)
    }

    /// Detects the language of `text` and picks the matching voice locale.
    pub async fn detect_voice_locale(&self, text: &str) -> Result<&'static str> {
        let code = self.detect(text).await?;
        Ok(voice_locale(&code))
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::config::tests::base_vars;

    async fn client_for(server: &MockServer) -> LanguageClient {
        let mut vars = base_vars();
        vars.insert("TEXT_ANALYTICS_ENDPOINT", server.uri());
        let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
        LanguageClient::new(&config, Client::new()).unwrap()
    }

    fn detected(code: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{
                "id": "1",
                "detectedLanguage": { "name": "whatever", "iso6391Name": code, "confidenceScore": 1.0 },
                "warnings": []
            }],
            "errors": [],
            "modelVersion": "2022-10-01"
        }))
    }

    #[test]
    fn table_entries_map_exactly() {
        for (code, locale) in VOICE_LOCALES {
            assert_eq!(voice_locale(code), *locale);
        }
        assert_eq!(voice_locale("zh_cht"), "zh-CN");
        assert_eq!(voice_locale("ar"), "ar-AE");
    }

    #[test]
    fn unknown_codes_fall_back() {
        for code in ["nl", "ru", "", "EN", "(Unknown)"] {
            assert_eq!(voice_locale(code), DEFAULT_VOICE_LOCALE);
        }
    }

    #[tokio::test]
    async fn detects_voice_locale() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text/analytics/v3.1/languages"))
            .and(header("Ocp-Apim-Subscription-Key", "lang-key"))
            .and(body_partial_json(json!({
                "documents": [{ "id": "1", "text": "Bonjour tout le monde" }]
            })))
            .respond_with(detected("fr"))
            .expect(1)
            .mount(&server)
            .await;

        let locale = client_for(&server)
            .await
            .detect_voice_locale("Bonjour tout le monde")
            .await
            .unwrap();
        assert_eq!(locale, "fr-FR");
    }

    #[tokio::test]
    async fn empty_text_never_reaches_the_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(detected("en"))
            .expect(0)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .detect_voice_locale("")
            .await
            .unwrap_err();
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn document_errors_are_upstream_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [],
                "errors": [{ "id": "1", "error": { "code": "InvalidArgument" } }]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .detect_voice_locale("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResponse { .. }));
    }
}
