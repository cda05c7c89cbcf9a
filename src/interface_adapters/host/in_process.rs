// Tokio-backed extension host: every context runs in this process and the
// browser primitives are simulated in memory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::task::JoinSet;
use url::Url;

use crate::domain::errors::HostError;
use crate::domain::ports::{Cookie, CookieFilter, Tab, TabId};
use crate::interface_adapters::host::callback::{Callback, CallbackHost};
use crate::interface_adapters::host::{ExtensionHost, MessageListener, NO_RECEIVER};

/// Which extension context a handle speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Background,
    Popup,
    Page(TabId),
}

impl ContextKind {
    // Runtime messages reach extension pages, never content scripts.
    fn receives_runtime(self) -> bool {
        matches!(self, ContextKind::Background | ContextKind::Popup)
    }
}

#[derive(Default)]
struct TabRegistry {
    next_id: TabId,
    tabs: Vec<Tab>,
    active: Option<TabId>,
}

struct HostInner {
    listeners: RwLock<Vec<(ContextKind, Arc<dyn MessageListener>)>>,
    storage: tokio::sync::Mutex<Map<String, Value>>,
    storage_path: Option<PathBuf>,
    cookies: RwLock<Vec<Cookie>>,
    tabs: Mutex<TabRegistry>,
}

/// Shared host; hand out one [`HostHandle`] per context.
#[derive(Clone)]
pub struct InProcessHost {
    inner: Arc<HostInner>,
}

impl Default for InProcessHost {
    fn default() -> Self {
        Self::build(Map::new(), None)
    }
}

impl InProcessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage is loaded from and written back to a JSON file.
    pub async fn with_storage_file(path: impl AsRef<Path>) -> Result<Self, HostError> {
        let path = path.as_ref().to_path_buf();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                HostError::new(format!("corrupt storage file {}: {err}", path.display()))
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(err) => {
                return Err(HostError::new(format!(
                    "failed to read storage file {}: {err}",
                    path.display()
                )));
            }
        };
        tracing::debug!(path = %path.display(), keys = items.len(), "storage loaded.");
        Ok(Self::build(items, Some(path)))
    }

    fn build(items: Map<String, Value>, storage_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(HostInner {
                listeners: RwLock::new(Vec::new()),
                storage: tokio::sync::Mutex::new(items),
                storage_path,
                cookies: RwLock::new(Vec::new()),
                tabs: Mutex::new(TabRegistry {
                    next_id: 1,
                    ..Default::default()
                }),
            }),
        }
    }

    pub fn handle(&self, context: ContextKind) -> HostHandle {
        HostHandle {
            host: self.clone(),
            context,
        }
    }

    pub fn add_cookies(&self, cookies: impl IntoIterator<Item = Cookie>) {
        self.inner
            .cookies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(cookies);
    }

    /// Open a tab and make it the active one.
    pub fn open_tab(&self, url: &str) -> Tab {
        let mut registry = self.inner.tabs.lock().unwrap_or_else(PoisonError::into_inner);
        let tab = Tab {
            id: registry.next_id,
            url: Some(url.to_string()),
        };
        registry.next_id += 1;
        registry.active = Some(tab.id);
        registry.tabs.push(tab.clone());
        tab
    }

    /// Close a tab; its page listeners stop receiving messages.
    pub fn close_tab(&self, tab_id: TabId) {
        {
            let mut registry = self.inner.tabs.lock().unwrap_or_else(PoisonError::into_inner);
            registry.tabs.retain(|tab| tab.id != tab_id);
            if registry.active == Some(tab_id) {
                registry.active = registry.tabs.last().map(|tab| tab.id);
            }
        }
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(context, _)| *context != ContextKind::Page(tab_id));
    }

    /// Drop every listener a context registered, as when a popup closes.
    pub fn unload(&self, context: ContextKind) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(registered, _)| *registered != context);
    }

    fn receivers(&self, accepts: impl Fn(ContextKind) -> bool) -> Vec<Arc<dyn MessageListener>> {
        self.inner
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(context, _)| accepts(*context))
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    // Each listener runs in its own task; the first reply wins.
    async fn deliver(
        &self,
        receivers: Vec<Arc<dyn MessageListener>>,
        message: Value,
    ) -> Result<Option<Value>, HostError> {
        if receivers.is_empty() {
            return Err(HostError::new(NO_RECEIVER));
        }

        let mut pending = JoinSet::new();
        for receiver in receivers {
            let message = message.clone();
            pending.spawn(async move { receiver.on_message(message).await });
        }

        while let Some(joined) = pending.join_next().await {
            match joined {
                Ok(Some(reply)) => {
                    // Remaining listeners finish on their own.
                    pending.detach_all();
                    return Ok(Some(reply));
                }
                Ok(None) => {}
                Err(err) => tracing::error!(error = %err, "listener task failed."),
            }
        }
        Ok(None)
    }

    async fn persist(&self, items: &Map<String, Value>) -> Result<(), HostError> {
        let Some(path) = &self.inner.storage_path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(items).map_err(|err| HostError::new(err.to_string()))?;
        tokio::fs::write(path, bytes).await.map_err(|err| {
            HostError::new(format!("failed to write storage file {}: {err}", path.display()))
        })
    }
}

/// One context's connection to the host.
#[derive(Clone)]
pub struct HostHandle {
    host: InProcessHost,
    context: ContextKind,
}

impl HostHandle {
    pub fn context(&self) -> ContextKind {
        self.context
    }

    /// The same context seen through the callback-style API.
    pub fn callback_style(self) -> CallbackHandle {
        CallbackHandle { inner: self }
    }
}

#[async_trait]
impl ExtensionHost for HostHandle {
    async fn send_runtime_message(&self, message: Value) -> Result<Option<Value>, HostError> {
        let sender = self.context;
        let receivers = self
            .host
            .receivers(|context| context.receives_runtime() && context != sender);
        self.host.deliver(receivers, message).await
    }

    async fn send_tab_message(
        &self,
        tab_id: TabId,
        message: Value,
    ) -> Result<Option<Value>, HostError> {
        let receivers = self
            .host
            .receivers(|context| context == ContextKind::Page(tab_id));
        self.host.deliver(receivers, message).await
    }

    async fn storage_get(&self, keys: &[&str]) -> Result<Map<String, Value>, HostError> {
        let items = self.host.inner.storage.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| items.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn storage_set(&self, items: Map<String, Value>) -> Result<(), HostError> {
        let mut stored = self.host.inner.storage.lock().await;
        let mut next = stored.clone();
        next.extend(items);
        // Memory only moves once the file write has landed.
        self.host.persist(&next).await?;
        *stored = next;
        Ok(())
    }

    async fn storage_remove(&self, keys: &[&str]) -> Result<(), HostError> {
        let mut stored = self.host.inner.storage.lock().await;
        let mut next = stored.clone();
        for key in keys {
            next.remove(*key);
        }
        self.host.persist(&next).await?;
        *stored = next;
        Ok(())
    }

    async fn tabs_create(&self, url: &str) -> Result<Tab, HostError> {
        Url::parse(url).map_err(|err| HostError::new(format!("Invalid url {url}: {err}")))?;
        let tab = self.host.open_tab(url);
        tracing::info!(tab_id = tab.id, %url, "tab opened.");
        Ok(tab)
    }

    async fn tabs_query_active(&self) -> Result<Vec<Tab>, HostError> {
        let registry = self
            .host
            .inner
            .tabs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(registry
            .tabs
            .iter()
            .filter(|tab| Some(tab.id) == registry.active)
            .cloned()
            .collect())
    }

    async fn cookies_get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError> {
        let host = match filter {
            CookieFilter::Url(url) => Url::parse(url)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .ok_or_else(|| HostError::new(format!("Invalid url: {url}")))?,
            CookieFilter::Domain(domain) => domain.trim_start_matches('.').to_string(),
        };

        let cookies = self
            .host
            .inner
            .cookies
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(cookies
            .iter()
            .filter(|cookie| domain_matches(&host, &cookie.domain))
            .cloned()
            .collect())
    }

    fn add_listener(&self, listener: Arc<dyn MessageListener>) {
        self.host
            .inner
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.context, listener));
    }
}

// A cookie for `example.com` (or `.example.com`) also applies to subdomains.
fn domain_matches(host: &str, cookie_domain: &str) -> bool {
    let cookie_domain = cookie_domain.trim_start_matches('.');
    host == cookie_domain
        || host
            .strip_suffix(cookie_domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Callback-style view of a [`HostHandle`]; callbacks run on spawned tasks.
#[derive(Clone)]
pub struct CallbackHandle {
    inner: HostHandle,
}

impl CallbackHost for CallbackHandle {
    fn send_runtime_message(&self, message: Value, callback: Callback<Option<Value>>) {
        let handle = self.inner.clone();
        tokio::spawn(async move { callback(handle.send_runtime_message(message).await) });
    }

    fn send_tab_message(&self, tab_id: TabId, message: Value, callback: Callback<Option<Value>>) {
        let handle = self.inner.clone();
        tokio::spawn(async move { callback(handle.send_tab_message(tab_id, message).await) });
    }

    fn storage_get(&self, keys: Vec<String>, callback: Callback<Map<String, Value>>) {
        let handle = self.inner.clone();
        tokio::spawn(async move {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            callback(handle.storage_get(&keys).await)
        });
    }

    fn storage_set(&self, items: Map<String, Value>, callback: Callback<()>) {
        let handle = self.inner.clone();
        tokio::spawn(async move { callback(handle.storage_set(items).await) });
    }

    fn storage_remove(&self, keys: Vec<String>, callback: Callback<()>) {
        let handle = self.inner.clone();
        tokio::spawn(async move {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            callback(handle.storage_remove(&keys).await)
        });
    }

    fn tabs_create(&self, url: String, callback: Callback<Tab>) {
        let handle = self.inner.clone();
        tokio::spawn(async move { callback(handle.tabs_create(&url).await) });
    }

    fn tabs_query_active(&self, callback: Callback<Vec<Tab>>) {
        let handle = self.inner.clone();
        tokio::spawn(async move { callback(handle.tabs_query_active().await) });
    }

    fn cookies_get_all(&self, filter: CookieFilter, callback: Callback<Vec<Cookie>>) {
        let handle = self.inner.clone();
        tokio::spawn(async move { callback(handle.cookies_get_all(&filter).await) });
    }

    fn add_listener(&self, listener: Arc<dyn MessageListener>) {
        ExtensionHost::add_listener(&self.inner, listener);
    }
}
