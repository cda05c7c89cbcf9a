// Bridge from callback-style hosts to the promise-style surface.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::domain::errors::HostError;
use crate::domain::ports::{Cookie, CookieFilter, Tab, TabId};
use crate::interface_adapters::host::{ExtensionHost, MessageListener};

// Reported when a host drops a callback without calling it.
const CONTEXT_INVALIDATED: &str = "Extension context invalidated.";

pub type Callback<T> = Box<dyn FnOnce(Result<T, HostError>) + Send>;

/// Host flavour that reports every result through a callback.
pub trait CallbackHost: Send + Sync {
    fn send_runtime_message(&self, message: Value, callback: Callback<Option<Value>>);
    fn send_tab_message(&self, tab_id: TabId, message: Value, callback: Callback<Option<Value>>);
    fn storage_get(&self, keys: Vec<String>, callback: Callback<Map<String, Value>>);
    fn storage_set(&self, items: Map<String, Value>, callback: Callback<()>);
    fn storage_remove(&self, keys: Vec<String>, callback: Callback<()>);
    fn tabs_create(&self, url: String, callback: Callback<Tab>);
    fn tabs_query_active(&self, callback: Callback<Vec<Tab>>);
    fn cookies_get_all(&self, filter: CookieFilter, callback: Callback<Vec<Cookie>>);
    fn add_listener(&self, listener: Arc<dyn MessageListener>);
}

/// Promise-style view of a [`CallbackHost`].
pub struct Promisified<C> {
    inner: C,
}

impl<C> Promisified<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

// The callback completes a one-shot channel; the returned future owns only the receiver.
fn bridge<T>(start: impl FnOnce(Callback<T>)) -> impl Future<Output = Result<T, HostError>> + Send
where
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    start(Box::new(move |result| {
        let _ = tx.send(result);
    }));
    async move {
        rx.await
            .unwrap_or_else(|_| Err(HostError::new(CONTEXT_INVALIDATED)))
    }
}

fn owned_keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| key.to_string()).collect()
}

#[async_trait]
impl<C> ExtensionHost for Promisified<C>
where
    C: CallbackHost,
{
    async fn send_runtime_message(&self, message: Value) -> Result<Option<Value>, HostError> {
        bridge(|done| self.inner.send_runtime_message(message, done)).await
    }

    async fn send_tab_message(
        &self,
        tab_id: TabId,
        message: Value,
    ) -> Result<Option<Value>, HostError> {
        bridge(|done| self.inner.send_tab_message(tab_id, message, done)).await
    }

    async fn storage_get(&self, keys: &[&str]) -> Result<Map<String, Value>, HostError> {
        let keys = owned_keys(keys);
        bridge(|done| self.inner.storage_get(keys, done)).await
    }

    async fn storage_set(&self, items: Map<String, Value>) -> Result<(), HostError> {
        bridge(|done| self.inner.storage_set(items, done)).await
    }

    async fn storage_remove(&self, keys: &[&str]) -> Result<(), HostError> {
        let keys = owned_keys(keys);
        bridge(|done| self.inner.storage_remove(keys, done)).await
    }

    async fn tabs_create(&self, url: &str) -> Result<Tab, HostError> {
        let url = url.to_string();
        bridge(|done| self.inner.tabs_create(url, done)).await
    }

    async fn tabs_query_active(&self) -> Result<Vec<Tab>, HostError> {
        bridge(|done| self.inner.tabs_query_active(done)).await
    }

    async fn cookies_get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError> {
        let filter = filter.clone();
        bridge(|done| self.inner.cookies_get_all(filter, done)).await
    }

    fn add_listener(&self, listener: Arc<dyn MessageListener>) {
        self.inner.add_listener(listener);
    }
}
