// The clients defined here are reqwest clients for the TaleName API and the
// Hytale accounts site.

pub mod backend;
pub mod page;

use std::collections::HashSet;
use std::fmt;

use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};

use crate::domain::errors::RemoteError;
use crate::domain::ports::{Cookie, CookieFilter, CookieSource};

pub use backend::BackendClient;
pub use page::AccountsPageClient;

#[derive(Debug)]
pub enum BackendError {
    Transport(reqwest::Error),
    Upstream { status: StatusCode, message: String },
    Decode(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Transport(err) => write!(f, "backend transport error: {err}"),
            BackendError::Upstream { status, message } => {
                write!(f, "backend upstream error {status}: {message}")
            }
            BackendError::Decode(err) => write!(f, "backend response decode error: {err}"),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for RemoteError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Transport(err) => RemoteError::Transport(err.to_string()),
            BackendError::Upstream { status, message } => RemoteError::Upstream {
                status: status.as_u16(),
                message,
            },
            BackendError::Decode(message) => RemoteError::Decode(message),
        }
    }
}

/// Turn a response into JSON, mapping non-2xx replies to `Upstream`.
///
/// 204 and zero-length bodies yield `Value::Null`. Any other body must be
/// valid JSON.
pub(crate) async fn read_json(response: Response) -> Result<Value, BackendError> {
    let status = response.status();

    if !status.is_success() {
        // Error bodies are best effort; a non-JSON body reads as `{}`.
        let body = response
            .json::<Value>()
            .await
            .unwrap_or_else(|_| Value::Object(Map::new()));
        let message =
            error_message(&body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        return Err(BackendError::Upstream { status, message });
    }

    if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
        return Ok(Value::Null);
    }

    let bytes = response.bytes().await.map_err(BackendError::Transport)?;
    serde_json::from_slice(&bytes).map_err(|err| BackendError::Decode(err.to_string()))
}

// Prefer `error`, then `message`.
fn error_message(body: &Value) -> Option<String> {
    ["error", "message"].iter().find_map(|key| {
        body.get(*key)
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(str::to_string)
    })
}

/// Join cookies into one header value; the first cookie seen for a name wins.
pub(crate) fn join_cookies(cookies: impl IntoIterator<Item = Cookie>) -> Option<String> {
    let mut seen = HashSet::new();
    let pairs: Vec<String> = cookies
        .into_iter()
        .filter(|cookie| seen.insert(cookie.name.clone()))
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect();

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

/// Collect the session cookies for `domain`, `api.<domain>` and `www.<domain>`.
pub(crate) async fn session_cookie_header<C>(cookies: &C, domain: &str) -> Option<String>
where
    C: CookieSource,
{
    let hosts = [
        domain.to_string(),
        format!("api.{domain}"),
        format!("www.{domain}"),
    ];

    let mut found = Vec::new();
    for host in hosts {
        let url = format!("https://{host}");
        match cookies.get_all(&CookieFilter::Url(url.clone())).await {
            Ok(batch) => found.extend(batch),
            // Some hosts only support domain filters.
            Err(_) => match cookies.get_all(&CookieFilter::Domain(host)).await {
                Ok(batch) => found.extend(batch),
                Err(err) => tracing::info!(%url, error = %err, "could not get cookies."),
            },
        }
    }

    let header = join_cookies(found);
    match &header {
        Some(header) => tracing::debug!(
            %domain,
            count = header.split("; ").count(),
            "session cookies attached."
        ),
        None => tracing::debug!(%domain, "no session cookies found."),
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::HostError;
    use async_trait::async_trait;
    use serde_json::json;

    fn cookie(name: &str, value: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: "talename.net".to_string(),
        }
    }

    // Url lookups fail for the www host; domain lookups fail for everything.
    struct PickyCookies;

    #[async_trait]
    impl CookieSource for PickyCookies {
        async fn get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError> {
            match filter {
                CookieFilter::Url(url) if url == "https://talename.net" => {
                    Ok(vec![cookie("session", "root"), cookie("theme", "dark")])
                }
                CookieFilter::Url(url) if url == "https://api.talename.net" => {
                    Ok(vec![cookie("session", "api"), cookie("csrf", "x")])
                }
                CookieFilter::Url(_) => Err(HostError::new("unsupported filter")),
                CookieFilter::Domain(_) => Err(HostError::new("no such domain")),
            }
        }
    }

    #[test]
    fn when_cookie_names_repeat_then_first_value_wins() {
        let header = join_cookies(vec![
            cookie("session", "first"),
            cookie("other", "1"),
            cookie("session", "second"),
        ]);

        assert_eq!(header.as_deref(), Some("session=first; other=1"));
    }

    #[test]
    fn when_no_cookies_exist_then_no_header_is_built() {
        assert_eq!(join_cookies(Vec::new()), None);
    }

    #[tokio::test]
    async fn when_hosts_overlap_then_header_keeps_first_seen_cookie() {
        let header = session_cookie_header(&PickyCookies, "talename.net").await;

        assert_eq!(
            header.as_deref(),
            Some("session=root; theme=dark; csrf=x")
        );
    }

    #[test]
    fn when_error_body_has_both_fields_then_error_wins() {
        assert_eq!(
            error_message(&json!({ "error": "bad session", "message": "ignored" })),
            Some("bad session".to_string())
        );
        assert_eq!(
            error_message(&json!({ "message": "try later" })),
            Some("try later".to_string())
        );
        assert_eq!(error_message(&json!({})), None);
    }

    #[test]
    fn when_backend_error_converts_then_status_and_message_are_kept() {
        let err: RemoteError = BackendError::Upstream {
            status: StatusCode::FORBIDDEN,
            message: "bad session".to_string(),
        }
        .into();

        assert_eq!(
            err,
            RemoteError::Upstream {
                status: 403,
                message: "bad session".to_string()
            }
        );
        assert_eq!(err.message(), "bad session");
    }
}
