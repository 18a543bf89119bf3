use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can abort a request.
///
/// Only [`Error::MissingInput`] is the caller's fault; every other variant is reported to the
/// caller as a generic failure while the detail is logged.
#[derive(Debug, Error)]
pub enum Error {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("request to {service} failed")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The upstream answered, but not with anything we can parse.
    #[error("{service} returned a malformed payload: {reason}")]
    MalformedResponse {
        service: &'static str,
        reason: String,
    },

    /// The upstream answered with a well-formed payload that carries nothing to use.
    #[error("{service} returned an empty payload")]
    EmptyResponse { service: &'static str },

    #[error("model requested unknown function `{0}`")]
    UnknownFunction(String),

    #[error("invalid arguments for function `{function}`")]
    InvalidArgument {
        function: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("search index returned no documents")]
    NotFound,

    #[error("failed to sign blob url: {0}")]
    Signing(String),

    #[error("failed to acquire access token: {0}")]
    Auth(String),
}

impl Error {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::MissingInput(_))
    }

    /// True for the network/status/payload failures of an external service.
    pub(crate) fn is_upstream(&self) -> bool {
        matches!(
            self,
            Error::Request { .. }
                | Error::Status { .. }
                | Error::MalformedResponse { .. }
                | Error::EmptyResponse { .. }
        )
    }

    pub(crate) fn malformed(service: &'static str, reason: impl ToString) -> Self {
        Error::MalformedResponse {
            service,
            reason: reason.to_string(),
        }
    }
}

/// Sends a prepared request and decodes a JSON body, folding every failure into [`Error`].
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T> {
    let resp = request
        .send()
        .await
        .map_err(|source| Error::Request { service, source })?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|source| Error::Request { service, source })?;

    if !status.is_success() {
        return Err(Error::Status {
            service,
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| Error::malformed(service, e))
}
