use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{Client, Method};
use serde::Serialize;
use serde_json::Value;

use crate::domain::entities::{ProofPayload, UserProfile};
use crate::domain::errors::RemoteError;
use crate::domain::ports::{CookieSource, UsernameBackend};
use crate::interface_adapters::clients::{BackendError, read_json, session_cookie_header};

pub const CURRENT_USER_PATH: &str = "/auth/me";
pub const CLAIM_PATH: &str = "/api/username/claim-from-extension";

#[derive(Debug, Serialize)]
struct ClaimRequest<'a> {
    username: &'a str,
    proof: &'a ProofPayload,
}

// Thin reqwest client for the TaleName API; session cookies come from the host.
#[derive(Clone)]
pub struct BackendClient<C> {
    http: Client,
    pub base_url: String,
    cookie_domain: String,
    cookies: C,
}

impl<C> BackendClient<C>
where
    C: CookieSource,
{
    pub fn new(
        base_url: impl Into<String>,
        cookie_domain: impl Into<String>,
        timeout: Duration,
        cookies: C,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie_domain: cookie_domain.into(),
            cookies,
        })
    }

    async fn request<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<Value, BackendError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%method, %url, "backend request.");

        let mut request = self
            .http
            .request(method, &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = session_cookie_header(&self.cookies, &self.cookie_domain).await {
            request = request.header(COOKIE, cookie);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(BackendError::Transport)?;
        tracing::debug!(status = %response.status(), %url, "backend response.");
        read_json(response).await
    }
}

#[async_trait]
impl<C> UsernameBackend for BackendClient<C>
where
    C: CookieSource,
{
    async fn current_user(&self) -> Result<UserProfile, RemoteError> {
        let body = self
            .request::<()>(Method::GET, CURRENT_USER_PATH, None)
            .await?;
        serde_json::from_value(body)
            .map_err(|err| BackendError::Decode(err.to_string()).into())
    }

    async fn claim_username(
        &self,
        username: &str,
        proof: &ProofPayload,
    ) -> Result<Value, RemoteError> {
        let body = ClaimRequest { username, proof };
        Ok(self.request(Method::POST, CLAIM_PATH, Some(&body)).await?)
    }
}
