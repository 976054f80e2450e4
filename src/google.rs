//! Request plumbing shared by the Drive and YouTube clients

use crate::auth::CredentialProvider;
use crate::error::{Error, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

/// Send a request with a bearer token, refreshing and replaying once on 401
///
/// `build` is called with the token for each attempt, so request bodies must be cheap
/// to rebuild. The response is returned whatever its status.
pub(crate) async fn send_authorized<F>(
    credentials: &dyn CredentialProvider,
    build: F,
) -> Result<Response>
where
    F: Fn(&str) -> RequestBuilder,
{
    let token = credentials.get_token().await?;
    let response = build(token.secret()).send().await?;
    if response.status() != StatusCode::UNAUTHORIZED {
        return Ok(response);
    }

    debug!("access token rejected, refreshing and replaying request");
    let token = credentials.refresh().await?;
    Ok(build(token.secret()).send().await?)
}

/// Turn a non-success response into [`Error::Api`]
pub(crate) async fn api_error(service: &'static str, response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => Error::Api {
            service,
            status,
            reason: envelope.error.errors.into_iter().find_map(|e| e.reason),
            message: envelope.error.message,
        },
        Err(_) => Error::Api {
            service,
            status,
            reason: None,
            message: body,
        },
    }
}

/// Pass successful responses through, convert the rest with [`api_error`]
pub(crate) async fn ensure_success(service: &'static str, response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(api_error(service, response).await)
    }
}

/// Join a base URL and an absolute path without doubling the slash
pub(crate) fn endpoint(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
