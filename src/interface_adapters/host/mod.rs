// Extension host primitives and the adapters built on them.

pub mod browser_api;
pub mod callback;
pub mod in_process;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::errors::HostError;
use crate::domain::ports::{Cookie, CookieFilter, Tab, TabId};

pub use browser_api::BrowserApi;
pub use callback::{Callback, CallbackHost, Promisified};
pub use in_process::{CallbackHandle, ContextKind, HostHandle, InProcessHost};

// Error text hosts report when a message has nowhere to go.
pub const NO_RECEIVER: &str = "Could not establish connection. Receiving end does not exist.";

/// Receives raw messages delivered to one context.
///
/// Returning `None` tells the host this listener does not answer.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: Value) -> Option<Value>;
}

/// Promise-style host surface, one context's view of the browser.
///
/// Values are untyped JSON at this level; the typed protocol lives in
/// [`BrowserApi`].
#[async_trait]
pub trait ExtensionHost: Send + Sync {
    async fn send_runtime_message(&self, message: Value) -> Result<Option<Value>, HostError>;
    async fn send_tab_message(&self, tab_id: TabId, message: Value)
    -> Result<Option<Value>, HostError>;
    async fn storage_get(&self, keys: &[&str]) -> Result<Map<String, Value>, HostError>;
    async fn storage_set(&self, items: Map<String, Value>) -> Result<(), HostError>;
    async fn storage_remove(&self, keys: &[&str]) -> Result<(), HostError>;
    async fn tabs_create(&self, url: &str) -> Result<Tab, HostError>;
    async fn tabs_query_active(&self) -> Result<Vec<Tab>, HostError>;
    async fn cookies_get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError>;
    fn add_listener(&self, listener: Arc<dyn MessageListener>);
}
