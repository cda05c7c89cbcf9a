use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::entities::{ProofPayload, UserProfile, UsernameRecord};
use crate::domain::errors::{HostError, LinkError, RemoteError};
use crate::domain::messages::{ExtensionMessage, MessageResponse};
use crate::domain::ui::{ButtonState, Notice, Section};

pub type TabId = u32;

/// Browser tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    pub url: Option<String>,
}

/// Cookie as enumerated from the host cookie store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// Cookie store query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieFilter {
    Url(String),
    Domain(String),
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_epoch_millis(&self) -> u64;
}

// Port for the persisted key-value store shared by every context.
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, HostError>;
    async fn set(&self, items: Map<String, Value>) -> Result<(), HostError>;
    async fn remove(&self, keys: &[&str]) -> Result<(), HostError>;
}

// Port for reading cookies the browser holds.
#[async_trait]
pub trait CookieSource: Send + Sync {
    async fn get_all(&self, filter: &CookieFilter) -> Result<Vec<Cookie>, HostError>;
}

// Port for tab management.
#[async_trait]
pub trait Tabs: Send + Sync {
    async fn create(&self, url: &str) -> Result<Tab, HostError>;
    async fn query_active(&self) -> Result<Vec<Tab>, HostError>;
}

// Port for sending typed messages to other contexts.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_runtime(
        &self,
        message: &ExtensionMessage,
    ) -> Result<Option<MessageResponse>, LinkError>;

    async fn send_to_tab(
        &self,
        tab_id: TabId,
        message: &ExtensionMessage,
    ) -> Result<Option<MessageResponse>, LinkError>;
}

// Implemented by each context that listens for messages.
// Returning None means no reply is sent for this message.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: ExtensionMessage) -> Option<MessageResponse>;
}

// The coordinator depends on this trait, not the concrete HTTP client.
#[async_trait]
pub trait UsernameBackend: Send + Sync {
    async fn current_user(&self) -> Result<UserProfile, RemoteError>;

    async fn claim_username(
        &self,
        username: &str,
        proof: &ProofPayload,
    ) -> Result<Value, RemoteError>;
}

// Data the detection agent can read from the target page.
#[async_trait]
pub trait PageSource: Send + Sync {
    // Credentialed GET against the page origin, parsed as JSON.
    async fn fetch_json(&self, url: &str) -> Result<Value, RemoteError>;

    // Records the host extracted from the rendered page.
    fn page_records(&self) -> Vec<UsernameRecord>;
}

// Rendering surface of the popup.
pub trait ClaimView: Send + Sync {
    fn show_section(&self, section: Section);
    fn show_user(&self, user: &UserProfile);
    fn render_claim_dialog(&self, reservations: &[UsernameRecord]);
    fn close_claim_dialog(&self);
    fn show_modal(&self, notice: &Notice);
    fn show_success(&self, message: &str);
}

// Rendering surface of the injected page button.
pub trait PageAffordance: Send + Sync {
    fn set_button(&self, state: ButtonState);
    fn show_modal(&self, notice: &Notice);
}
