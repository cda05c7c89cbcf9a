use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, COOKIE};
use serde_json::Value;

use crate::domain::entities::UsernameRecord;
use crate::domain::errors::RemoteError;
use crate::domain::ports::{CookieFilter, CookieSource, PageSource};
use crate::interface_adapters::clients::{BackendError, join_cookies, read_json};

/// Credentialed reads against the Hytale accounts site.
///
/// Requests carry the cookies the host holds for the requested URL, the way
/// a same-origin `fetch` with `credentials: "include"` would.
#[derive(Clone)]
pub struct AccountsPageClient<C> {
    http: Client,
    cookies: C,
    // Records already rendered on the page, used as the last fallback.
    page_records: Vec<UsernameRecord>,
}

impl<C> AccountsPageClient<C>
where
    C: CookieSource,
{
    pub fn new(timeout: Duration, cookies: C) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            cookies,
            page_records: Vec::new(),
        })
    }

    pub fn with_page_records(mut self, records: Vec<UsernameRecord>) -> Self {
        self.page_records = records;
        self
    }
}

#[async_trait]
impl<C> PageSource for AccountsPageClient<C>
where
    C: CookieSource,
{
    async fn fetch_json(&self, url: &str) -> Result<Value, RemoteError> {
        let mut request = self.http.get(url).header(ACCEPT, "*/*");

        match self.cookies.get_all(&CookieFilter::Url(url.to_string())).await {
            Ok(cookies) => {
                if let Some(cookie) = join_cookies(cookies) {
                    request = request.header(COOKIE, cookie);
                }
            }
            Err(err) => tracing::warn!(%url, error = %err, "page cookies unavailable."),
        }

        let response = request.send().await.map_err(BackendError::Transport)?;
        Ok(read_json(response).await?)
    }

    fn page_records(&self) -> Vec<UsernameRecord> {
        self.page_records.clone()
    }
}
