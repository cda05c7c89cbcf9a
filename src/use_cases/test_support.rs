use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::entities::{ProofPayload, UserProfile, UsernameRecord};
use crate::domain::errors::{HostError, LinkError, RemoteError};
use crate::domain::messages::{ExtensionMessage, MessageResponse};
use crate::domain::ports::{
    ClaimView, Clock, KeyValueStorage, Messenger, PageAffordance, PageSource, Tab, TabId, Tabs,
    UsernameBackend,
};
use crate::domain::ui::{ButtonState, Notice, Section};

pub(crate) const RECEIVER_GONE: &str =
    "Could not establish connection. Receiving end does not exist.";

// Shared fixed time source for deterministic proof timestamps.
pub(crate) struct FixedClock(pub(crate) u64);

impl Clock for FixedClock {
    fn now_epoch_millis(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Default)]
pub(crate) struct FailureFlags {
    pub get: bool,
    pub set: bool,
    pub remove: bool,
}

// In-memory key-value store that lets tests inspect what was written.
#[derive(Clone, Default)]
pub(crate) struct MemoryStorage {
    items: Arc<Mutex<Map<String, Value>>>,
    writes: Arc<Mutex<Vec<Vec<String>>>>,
    failures: FailureFlags,
}

impl MemoryStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_failures(mut self, failures: FailureFlags) -> Self {
        self.failures = failures;
        self
    }

    pub(crate) fn seed(&self, key: &str, value: Value) {
        let mut guard = self.items.lock().expect("storage mutex poisoned");
        guard.insert(key.to_string(), value);
    }

    pub(crate) fn value(&self, key: &str) -> Option<Value> {
        let guard = self.items.lock().expect("storage mutex poisoned");
        guard.get(key).cloned()
    }

    // Keys of each set() call, in order.
    pub(crate) fn writes(&self) -> Vec<Vec<String>> {
        self.writes.lock().expect("writes mutex poisoned").clone()
    }

    pub(crate) fn seed_authenticated(&self, username: &str) {
        self.seed("user", serde_json::json!({ "username": username }));
        self.seed("authenticated", Value::Bool(true));
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, HostError> {
        if self.failures.get {
            return Err(HostError::new("get failed"));
        }
        let guard = self.items.lock().expect("storage mutex poisoned");
        Ok(keys
            .iter()
            .filter_map(|key| guard.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<(), HostError> {
        if self.failures.set {
            return Err(HostError::new("set failed"));
        }
        self.writes
            .lock()
            .expect("writes mutex poisoned")
            .push(items.keys().cloned().collect());
        let mut guard = self.items.lock().expect("storage mutex poisoned");
        guard.extend(items);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), HostError> {
        if self.failures.remove {
            return Err(HostError::new("remove failed"));
        }
        let mut guard = self.items.lock().expect("storage mutex poisoned");
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }
}

type Reply = Result<Option<MessageResponse>, LinkError>;
type Responder = Arc<dyn Fn(&ExtensionMessage) -> Reply + Send + Sync>;

// Messenger fake: records every message and answers through a closure.
#[derive(Clone)]
pub(crate) struct RecordingMessenger {
    runtime: Arc<Mutex<Vec<ExtensionMessage>>>,
    tabs: Arc<Mutex<Vec<(TabId, ExtensionMessage)>>>,
    runtime_responder: Responder,
    tab_responder: Responder,
}

impl RecordingMessenger {
    // No counterpart is listening on either channel.
    pub(crate) fn new() -> Self {
        let gone: Responder = Arc::new(|_| Err(LinkError::classify(RECEIVER_GONE)));
        Self {
            runtime: Arc::new(Mutex::new(Vec::new())),
            tabs: Arc::new(Mutex::new(Vec::new())),
            runtime_responder: gone.clone(),
            tab_responder: gone,
        }
    }

    pub(crate) fn answering_runtime<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ExtensionMessage) -> Reply + Send + Sync + 'static,
    {
        self.runtime_responder = Arc::new(responder);
        self
    }

    pub(crate) fn answering_tabs<F>(mut self, responder: F) -> Self
    where
        F: Fn(&ExtensionMessage) -> Reply + Send + Sync + 'static,
    {
        self.tab_responder = Arc::new(responder);
        self
    }

    pub(crate) fn runtime_messages(&self) -> Vec<ExtensionMessage> {
        self.runtime.lock().expect("messages mutex poisoned").clone()
    }

    pub(crate) fn tab_messages(&self) -> Vec<(TabId, ExtensionMessage)> {
        self.tabs.lock().expect("messages mutex poisoned").clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_runtime(&self, message: &ExtensionMessage) -> Reply {
        self.runtime
            .lock()
            .expect("messages mutex poisoned")
            .push(message.clone());
        (self.runtime_responder)(message)
    }

    async fn send_to_tab(&self, tab_id: TabId, message: &ExtensionMessage) -> Reply {
        self.tabs
            .lock()
            .expect("messages mutex poisoned")
            .push((tab_id, message.clone()));
        (self.tab_responder)(message)
    }
}

// Backend fake with scripted results and call recording.
#[derive(Clone)]
pub(crate) struct FakeBackend {
    user: Result<UserProfile, RemoteError>,
    claim: Result<Value, RemoteError>,
    claims: Arc<Mutex<Vec<(String, ProofPayload)>>>,
    user_calls: Arc<Mutex<usize>>,
}

impl FakeBackend {
    pub(crate) fn authenticated(username: &str) -> Self {
        Self {
            user: Ok(UserProfile::new(username)),
            claim: Ok(serde_json::json!({ "claimed": true })),
            claims: Arc::new(Mutex::new(Vec::new())),
            user_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub(crate) fn rejecting(status: u16, message: &str) -> Self {
        let err = RemoteError::Upstream {
            status,
            message: message.to_string(),
        };
        Self {
            user: Err(err.clone()),
            claim: Err(err),
            ..Self::authenticated("unused")
        }
    }

    pub(crate) fn with_claim_result(mut self, claim: Result<Value, RemoteError>) -> Self {
        self.claim = claim;
        self
    }

    pub(crate) fn claims(&self) -> Vec<(String, ProofPayload)> {
        self.claims.lock().expect("claims mutex poisoned").clone()
    }

    pub(crate) fn user_calls(&self) -> usize {
        *self.user_calls.lock().expect("calls mutex poisoned")
    }
}

#[async_trait]
impl UsernameBackend for FakeBackend {
    async fn current_user(&self) -> Result<UserProfile, RemoteError> {
        *self.user_calls.lock().expect("calls mutex poisoned") += 1;
        self.user.clone()
    }

    async fn claim_username(
        &self,
        username: &str,
        proof: &ProofPayload,
    ) -> Result<Value, RemoteError> {
        self.claims
            .lock()
            .expect("claims mutex poisoned")
            .push((username.to_string(), proof.clone()));
        self.claim.clone()
    }
}

// Tab fake with a single active tab and a log of opened urls.
#[derive(Clone, Default)]
pub(crate) struct FakeTabs {
    active: Arc<Mutex<Option<Tab>>>,
    created: Arc<Mutex<Vec<String>>>,
}

impl FakeTabs {
    pub(crate) fn on(url: &str) -> Self {
        let tabs = Self::default();
        tabs.navigate(url);
        tabs
    }

    pub(crate) fn navigate(&self, url: &str) {
        *self.active.lock().expect("tabs mutex poisoned") = Some(Tab {
            id: 7,
            url: Some(url.to_string()),
        });
    }

    pub(crate) fn created(&self) -> Vec<String> {
        self.created.lock().expect("tabs mutex poisoned").clone()
    }
}

#[async_trait]
impl Tabs for FakeTabs {
    async fn create(&self, url: &str) -> Result<Tab, HostError> {
        self.created
            .lock()
            .expect("tabs mutex poisoned")
            .push(url.to_string());
        Ok(Tab {
            id: 99,
            url: Some(url.to_string()),
        })
    }

    async fn query_active(&self) -> Result<Vec<Tab>, HostError> {
        let guard = self.active.lock().expect("tabs mutex poisoned");
        Ok(guard.iter().cloned().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ViewEvent {
    Section(Section),
    User(String),
    Dialog(Vec<String>),
    DialogClosed,
    Modal(Notice),
    Success(String),
}

// Popup view fake that keeps every render call.
#[derive(Clone, Default)]
pub(crate) struct RecordingView {
    events: Arc<Mutex<Vec<ViewEvent>>>,
}

impl RecordingView {
    pub(crate) fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().expect("events mutex poisoned").clone()
    }

    fn push(&self, event: ViewEvent) {
        self.events
            .lock()
            .expect("events mutex poisoned")
            .push(event);
    }
}

impl ClaimView for RecordingView {
    fn show_section(&self, section: Section) {
        self.push(ViewEvent::Section(section));
    }

    fn show_user(&self, user: &UserProfile) {
        self.push(ViewEvent::User(user.username.clone()));
    }

    fn render_claim_dialog(&self, reservations: &[UsernameRecord]) {
        self.push(ViewEvent::Dialog(
            reservations
                .iter()
                .map(|record| record.username().to_string())
                .collect(),
        ));
    }

    fn close_claim_dialog(&self) {
        self.push(ViewEvent::DialogClosed);
    }

    fn show_modal(&self, notice: &Notice) {
        self.push(ViewEvent::Modal(notice.clone()));
    }

    fn show_success(&self, message: &str) {
        self.push(ViewEvent::Success(message.to_string()));
    }
}

// Page button fake.
#[derive(Clone, Default)]
pub(crate) struct RecordingAffordance {
    buttons: Arc<Mutex<Vec<ButtonState>>>,
    modals: Arc<Mutex<Vec<Notice>>>,
}

impl RecordingAffordance {
    pub(crate) fn buttons(&self) -> Vec<ButtonState> {
        self.buttons.lock().expect("buttons mutex poisoned").clone()
    }

    pub(crate) fn modals(&self) -> Vec<Notice> {
        self.modals.lock().expect("modals mutex poisoned").clone()
    }
}

impl PageAffordance for RecordingAffordance {
    fn set_button(&self, state: ButtonState) {
        self.buttons
            .lock()
            .expect("buttons mutex poisoned")
            .push(state);
    }

    fn show_modal(&self, notice: &Notice) {
        self.modals
            .lock()
            .expect("modals mutex poisoned")
            .push(notice.clone());
    }
}

// Page fake keyed by endpoint path.
#[derive(Clone, Default)]
pub(crate) struct FakePage {
    responses: HashMap<String, Result<Value, RemoteError>>,
    records: Vec<UsernameRecord>,
}

impl FakePage {
    pub(crate) fn with_response(mut self, path: &str, response: Result<Value, RemoteError>) -> Self {
        self.responses.insert(path.to_string(), response);
        self
    }

    pub(crate) fn with_page_records(mut self, usernames: &[&str]) -> Self {
        self.records = usernames
            .iter()
            .filter_map(|name| UsernameRecord::new(*name))
            .collect();
        self
    }
}

#[async_trait]
impl PageSource for FakePage {
    async fn fetch_json(&self, url: &str) -> Result<Value, RemoteError> {
        self.responses
            .iter()
            .find(|(path, _)| url.ends_with(path.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| {
                Err(RemoteError::Upstream {
                    status: 404,
                    message: "HTTP 404".to_string(),
                })
            })
    }

    fn page_records(&self) -> Vec<UsernameRecord> {
        self.records.clone()
    }
}

pub(crate) fn records(usernames: &[&str]) -> Vec<UsernameRecord> {
    usernames
        .iter()
        .filter_map(|name| UsernameRecord::new(*name))
        .collect()
}

pub(crate) fn proof_at(timestamp: u64) -> ProofPayload {
    ProofPayload {
        reservations: Vec::new(),
        timestamp: Some(timestamp),
        source: None,
    }
}
