// Unified browser API: typed messaging plus storage, tabs and cookies, each
// offered as a deferred call and as a callback call.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::errors::{HostError, LinkError};
use crate::domain::messages::{ExtensionMessage, MessageResponse};
use crate::domain::ports::{
    Cookie, CookieFilter, CookieSource, KeyValueStorage, Messenger, Tab, TabId, Tabs,
};
use crate::interface_adapters::host::{ExtensionHost, MessageListener};

pub struct BrowserApi<H> {
    host: Arc<H>,
}

// Manual impl: deriving would require `H: Clone`.
impl<H> Clone for BrowserApi<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
        }
    }
}

impl<H> BrowserApi<H>
where
    H: ExtensionHost + 'static,
{
    pub fn new(host: H) -> Self {
        Self {
            host: Arc::new(host),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn add_listener(&self, listener: Arc<dyn MessageListener>) {
        self.host.add_listener(listener);
    }

    pub async fn send_message(
        &self,
        message: &ExtensionMessage,
    ) -> Result<Option<MessageResponse>, LinkError> {
        let raw = encode(message)?;
        let reply = self
            .host
            .send_runtime_message(raw)
            .await
            .map_err(LinkError::from)
            .inspect_err(|err| log_send_failure(err, message));
        decode_reply(reply?)
    }

    /// Callback form; failures resolve as `{success:false, error}`.
    pub fn send_message_with<F>(&self, message: ExtensionMessage, callback: F)
    where
        F: FnOnce(Option<MessageResponse>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            callback(callback_reply(api.send_message(&message).await));
        });
    }

    pub async fn send_tab_message(
        &self,
        tab_id: TabId,
        message: &ExtensionMessage,
    ) -> Result<Option<MessageResponse>, LinkError> {
        let raw = encode(message)?;
        let reply = self
            .host
            .send_tab_message(tab_id, raw)
            .await
            .map_err(LinkError::from)
            .inspect_err(|err| log_send_failure(err, message));
        decode_reply(reply?)
    }

    pub fn send_tab_message_with<F>(&self, tab_id: TabId, message: ExtensionMessage, callback: F)
    where
        F: FnOnce(Option<MessageResponse>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            callback(callback_reply(api.send_tab_message(tab_id, &message).await));
        });
    }

    pub async fn storage_get(&self, keys: &[&str]) -> Result<Map<String, Value>, HostError> {
        self.host.storage_get(keys).await
    }

    /// Yields an empty map when the read fails.
    pub fn storage_get_with<F>(&self, keys: Vec<String>, callback: F)
    where
        F: FnOnce(Map<String, Value>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let items = api.storage_get(&keys).await.unwrap_or_else(|err| {
                tracing::error!(error = %err, "storage get failed.");
                Map::new()
            });
            callback(items);
        });
    }

    pub async fn storage_set(&self, items: Map<String, Value>) -> Result<(), HostError> {
        self.host.storage_set(items).await
    }

    /// The callback runs whether or not the write succeeded.
    pub fn storage_set_with<F>(&self, items: Map<String, Value>, callback: F)
    where
        F: FnOnce(Result<(), HostError>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            let result = api.storage_set(items).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "storage set failed.");
            }
            callback(result);
        });
    }

    pub async fn storage_remove(&self, keys: &[&str]) -> Result<(), HostError> {
        self.host.storage_remove(keys).await
    }

    pub fn storage_remove_with<F>(&self, keys: Vec<String>, callback: F)
    where
        F: FnOnce(Result<(), HostError>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let result = api.storage_remove(&keys).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "storage remove failed.");
            }
            callback(result);
        });
    }

    pub async fn tabs_create(&self, url: &str) -> Result<Tab, HostError> {
        self.host.tabs_create(url).await
    }

    pub fn tabs_create_with<F>(&self, url: String, callback: F)
    where
        F: FnOnce(Option<Tab>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            let tab = api
                .tabs_create(&url)
                .await
                .inspect_err(|err| tracing::error!(%url, error = %err, "tab create failed."))
                .ok();
            callback(tab);
        });
    }

    pub async fn tabs_query_active(&self) -> Result<Vec<Tab>, HostError> {
        self.host.tabs_query_active().await
    }

    pub fn tabs_query_active_with<F>(&self, callback: F)
    where
        F: FnOnce(Vec<Tab>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            let tabs = api.tabs_query_active().await.unwrap_or_else(|err| {
                tracing::error!(error = %err, "tab query failed.");
                Vec::new()
            });
            callback(tabs);
        });
    }

    pub async fn cookies_get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError> {
        self.host.cookies_get_all(filter).await
    }

    /// Yields an empty list when enumeration fails.
    pub fn cookies_get_all_with<F>(&self, filter: CookieFilter, callback: F)
    where
        F: FnOnce(Vec<Cookie>) + Send + 'static,
    {
        let api = self.clone();
        tokio::spawn(async move {
            let cookies = api.cookies_get_all(&filter).await.unwrap_or_else(|err| {
                tracing::error!(error = %err, "cookie enumeration failed.");
                Vec::new()
            });
            callback(cookies);
        });
    }
}

fn encode(message: &ExtensionMessage) -> Result<Value, LinkError> {
    serde_json::to_value(message).map_err(|err| LinkError::Failed(err.to_string()))
}

fn decode_reply(reply: Option<Value>) -> Result<Option<MessageResponse>, LinkError> {
    match reply {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|err| LinkError::Failed(format!("invalid reply: {err}"))),
    }
}

fn callback_reply(
    result: Result<Option<MessageResponse>, LinkError>,
) -> Option<MessageResponse> {
    match result {
        Ok(reply) => reply,
        Err(err) => Some(MessageResponse::failure(err.message())),
    }
}

fn log_send_failure(err: &LinkError, message: &ExtensionMessage) {
    let action = message.action();
    if err.is_receiver_gone() {
        tracing::debug!(%action, error = %err, "message not delivered.");
    } else {
        tracing::error!(%action, error = %err, "message send failed.");
    }
}

#[async_trait]
impl<H> Messenger for BrowserApi<H>
where
    H: ExtensionHost + 'static,
{
    async fn send_runtime(
        &self,
        message: &ExtensionMessage,
    ) -> Result<Option<MessageResponse>, LinkError> {
        self.send_message(message).await
    }

    async fn send_to_tab(
        &self,
        tab_id: TabId,
        message: &ExtensionMessage,
    ) -> Result<Option<MessageResponse>, LinkError> {
        self.send_tab_message(tab_id, message).await
    }
}

#[async_trait]
impl<H> KeyValueStorage for BrowserApi<H>
where
    H: ExtensionHost + 'static,
{
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, HostError> {
        self.storage_get(keys).await
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), HostError> {
        self.storage_set(items).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), HostError> {
        self.storage_remove(keys).await
    }
}

#[async_trait]
impl<H> Tabs for BrowserApi<H>
where
    H: ExtensionHost + 'static,
{
    async fn create(&self, url: &str) -> Result<Tab, HostError> {
        self.tabs_create(url).await
    }

    async fn query_active(&self) -> Result<Vec<Tab>, HostError> {
        self.tabs_query_active().await
    }
}

#[async_trait]
impl<H> CookieSource for BrowserApi<H>
where
    H: ExtensionHost + 'static,
{
    async fn get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError> {
        self.cookies_get_all(filter).await
    }
}
