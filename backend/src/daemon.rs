use actix_web::{error::JsonPayloadError, web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::Result;
use tracing::{error, info, warn};

use crate::{error::Error, LocalClient};

/// Body of a 400 from the detect-language endpoint.
pub const MISSING_TEXT: &str = "Please pass a text on the query string";
/// Body of a 500 from the detect-language endpoint.
pub const DETECTION_FAILED: &str = "Error detecting language";
/// Body of a 500 from the message endpoint.
pub const MESSAGE_FAILED: &str = "Error generating a reply";

/// The global data used in the daemon. Clones are reference counted.
#[derive(Clone)]
pub struct Daemon {
    client: LocalClient,
}

impl Daemon {
    pub fn new(client: LocalClient) -> Self {
        Self { client }
    }
}

/// Registers the endpoints and their extractor configuration under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    use endpoints::*;

    cfg.service(
        web::scope("/api")
            .app_data(web::JsonConfig::default().error_handler(json_error))
            .service(detect_language_endpoint)
            .service(message_endpoint),
    );
}

/// Starts a daemon from the given `LocalClient`
pub async fn run(client: LocalClient, host: &str, port: u16) -> Result<()> {
    let daemon = Daemon::new(client);
    info!(host, port, "starting daemon");
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(daemon.clone()))
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await?;
    Ok(())
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    warn!("rejected message body: {err}");
    let response = HttpResponse::BadRequest().body(format!("Invalid transcript: {err}"));
    actix_web::error::InternalError::from_response(err, response).into()
}

/// Logs the failure and answers with a generic 500 body.
fn to_response(err: Error, message: &str) -> HttpResponse {
    let source = if err.is_upstream() { "upstream" } else { "internal" };
    let err = anyhow::Error::new(err);
    error!(
        source,
        backtrace = ?err.chain().map(|e| e.to_string()).collect::<Vec<_>>(),
        "daemon error: {err}"
    );
    HttpResponse::InternalServerError().body(message.to_string())
}

/// The API endpoints
pub mod endpoints {
    use actix_web::{get, post, web, HttpResponse, Responder};
    use serde::Deserialize;
    use tracing::{info_span, Instrument};
    use uuid::Uuid;

    use super::*;
    use crate::chat::Turn;

    #[derive(Deserialize)]
    pub struct DetectQuery {
        pub text: Option<String>,
    }

    #[get("/detectLanguage")]
    pub async fn detect_language_endpoint(
        query: web::Query<DetectQuery>,
        daemon: web::Data<Daemon>,
    ) -> impl Responder {
        let span = info_span!("detect_language", request_id = %Uuid::new_v4());
        async move {
            let text = query.into_inner().text.unwrap_or_default();
            match daemon.client.detect_language(&text).await {
                Ok(locale) => HttpResponse::Ok().content_type("text/plain").body(locale),
                Err(e) if e.is_client_error() => {
                    warn!("bad request: {e}");
                    HttpResponse::BadRequest().body(MISSING_TEXT)
                }
                Err(e) => to_response(e, DETECTION_FAILED),
            }
        }
        .instrument(span)
        .await
    }

    #[post("/message")]
    pub async fn message_endpoint(
        transcript: web::Json<Vec<Turn>>,
        daemon: web::Data<Daemon>,
    ) -> impl Responder {
        let span = info_span!("message", request_id = %Uuid::new_v4());
        async move {
            match daemon.client.message(transcript.into_inner()).await {
                Ok(exchange) => HttpResponse::Ok().json(exchange),
                Err(e) => to_response(e, MESSAGE_FAILED),
            }
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{body::to_bytes, http::StatusCode};

    use super::*;

    #[actix_web::test]
    async fn failures_answer_with_the_generic_body() {
        for err in [
            Error::EmptyResponse { service: "chat" },
            Error::NotFound,
            Error::UnknownFunction("get_weather".into()),
        ] {
            let resp = to_response(err, MESSAGE_FAILED);
            assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let body = to_bytes(resp.into_body()).await.unwrap();
            assert_eq!(body, MESSAGE_FAILED.as_bytes());
        }
    }
}
