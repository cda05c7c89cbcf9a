// Popup controller: auth polling, claim dialog and claim submission.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::domain::entities::{PendingClaim, ProofPayload, UserProfile, UsernameRecord};
use crate::domain::errors::{ClaimError, LinkError, ValidationError};
use crate::domain::messages::{ExtensionMessage, MessageResponse};
use crate::domain::ports::{ClaimView, KeyValueStorage, MessageHandler, Messenger, Tab, Tabs};
use crate::domain::ui::{Notice, Section};
use crate::use_cases::session_store::SessionStore;

const CLAIM_FAILED: &str = "Failed to claim username";

/// Timing and navigation targets for the popup.
#[derive(Debug, Clone)]
pub struct ClaimUiSettings {
    /// Delay between auth re-checks while the popup is open.
    pub poll_interval: Duration,
    /// Delay before polling starts and before a pushed dialog is re-checked.
    pub recheck_delay: Duration,
    /// Host the profiles page must be served from.
    pub profiles_host: String,
    pub login_url: String,
    pub profiles_url: String,
}

// What the popup currently knows.
#[derive(Default)]
struct UiSession {
    current_user: Option<UserProfile>,
    reservations: Vec<UsernameRecord>,
    proof: Option<ProofPayload>,
    dialog_open: bool,
}

/// Single controller instance per open popup.
pub struct ClaimUiController<M, T, S, V> {
    settings: ClaimUiSettings,
    messenger: M,
    tabs: T,
    store: SessionStore<S>,
    view: V,
    session: Mutex<UiSession>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl<M, T, S, V> ClaimUiController<M, T, S, V>
where
    M: Messenger + 'static,
    T: Tabs + 'static,
    S: KeyValueStorage + 'static,
    V: ClaimView + 'static,
{
    pub fn new(
        settings: ClaimUiSettings,
        messenger: M,
        tabs: T,
        store: SessionStore<S>,
        view: V,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            messenger,
            tabs,
            store,
            view,
            session: Mutex::new(UiSession::default()),
            poll_task: Mutex::new(None),
        })
    }

    /// Popup opened: check auth once, then keep polling.
    pub async fn open(self: &Arc<Self>) {
        self.view.show_section(Section::Loading);
        let tab = self.active_tab().await;
        tracing::info!(tab_url = ?tab.as_ref().and_then(|t| t.url.as_deref()), "popup opened.");

        self.check_auth(tab.and_then(|t| t.url)).await;
        self.start_polling().await;
    }

    /// Popup closing.
    pub async fn close(&self) {
        self.stop_polling().await;
    }

    // Idempotent; the first tick fires after the recheck delay plus one interval.
    pub async fn start_polling(self: &Arc<Self>) {
        let mut task = self.poll_task.lock().await;
        if task.is_some() {
            return;
        }

        tracing::debug!(interval_ms = self.settings.poll_interval.as_millis() as u64, "auth polling started.");
        let weak = Arc::downgrade(self);
        let delay = self.settings.recheck_delay;
        let period = self.settings.poll_interval;
        *task = Some(tokio::spawn(poll_loop(weak, delay, period)));
    }

    pub async fn stop_polling(&self) {
        if let Some(task) = self.poll_task.lock().await.take() {
            task.abort();
            tracing::debug!("auth polling stopped.");
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.poll_task.lock().await.is_some()
    }

    /// Ask the coordinator who is logged in and redraw accordingly.
    pub async fn check_auth(&self, tab_url: Option<String>) {
        let user = match self.messenger.send_runtime(&ExtensionMessage::GetUser).await {
            Ok(Some(MessageResponse {
                success: true,
                user: Some(user),
                ..
            })) => Some(user),
            Ok(_) => None,
            Err(err) => {
                log_link_failure(&err, "getUser");
                None
            }
        };

        let (previous, dialog_open) = {
            let mut session = self.session.lock().await;
            let previous = std::mem::replace(&mut session.current_user, user.clone());
            // A logout discards whatever dialog was open.
            if user.is_none() {
                session.reservations.clear();
                session.proof = None;
                session.dialog_open = false;
            }
            (previous, session.dialog_open)
        };
        match (&previous, &user) {
            (None, Some(user)) => tracing::info!(username = %user.username, "user authenticated."),
            (Some(_), None) => tracing::info!("user logged out."),
            _ => {}
        }

        let tab_url = match tab_url {
            Some(url) => Some(url),
            None => self.active_tab().await.and_then(|t| t.url),
        };
        let on_profiles = tab_url
            .as_deref()
            .is_some_and(|url| is_profiles_page(url, &self.settings.profiles_host));
        let section = derive_section(on_profiles, user.is_some(), dialog_open);
        self.view.show_section(section);
        if let (Section::Authenticated, Some(user)) = (section, &user) {
            self.view.show_user(user);
        }

        if user.is_some() {
            self.show_pending_claim().await;
        }
    }

    // Render and consume a stored pending claim, if any.
    async fn show_pending_claim(&self) {
        let pending = match self.store.load_pending().await {
            Ok(pending) => pending,
            Err(err) => {
                tracing::error!(error = %err, "failed to read pending claim.");
                return;
            }
        };
        let Some(claim) = pending else {
            return;
        };

        self.render_claim_dialog(claim.reservations, Some(claim.proof))
            .await;
        if let Err(err) = self.store.clear_pending().await {
            tracing::error!(error = %err, "failed to clear pending claim.");
        }
    }

    /// Empty lists leave the current view as it is.
    pub async fn render_claim_dialog(
        &self,
        reservations: Vec<UsernameRecord>,
        proof: Option<ProofPayload>,
    ) {
        if reservations.is_empty() {
            return;
        }

        self.view.render_claim_dialog(&reservations);
        self.view.show_section(Section::ClaimDialogOpen);
        let mut session = self.session.lock().await;
        session.reservations = reservations;
        session.proof = proof;
        session.dialog_open = true;
    }

    /// Pushed by the coordinator after the page requested a dialog.
    pub async fn on_show_claim_dialog(
        &self,
        reservations: Vec<UsernameRecord>,
        proof: Option<ProofPayload>,
    ) {
        if self.is_authenticated().await {
            self.render_pushed(reservations, proof).await;
            return;
        }

        // The login may have just completed; give the session a moment.
        let tab_url = self.active_tab().await.and_then(|t| t.url);
        self.check_auth(tab_url).await;
        tokio::time::sleep(self.settings.recheck_delay).await;

        if self.is_authenticated().await {
            self.render_pushed(reservations, proof).await;
        } else {
            // Left in the store; the next successful auth check renders it.
            tracing::debug!("claim dialog pushed while logged out.");
        }
    }

    async fn render_pushed(&self, reservations: Vec<UsernameRecord>, proof: Option<ProofPayload>) {
        if reservations.is_empty() {
            return;
        }
        self.render_claim_dialog(reservations, proof).await;
        if let Err(err) = self.store.clear_pending().await {
            tracing::error!(error = %err, "failed to clear pending claim.");
        }
    }

    /// Claim one of the displayed usernames.
    pub async fn claim(&self, username: &str) -> Result<Value, ClaimError> {
        let proof = match self.claim_preconditions().await {
            Ok(proof) => proof,
            Err(ClaimError::Unauthenticated) => {
                self.view.show_modal(&Notice::new(
                    "Authentication Required",
                    "Please log in to TaleName first.",
                ));
                self.login().await;
                return Err(ClaimError::Unauthenticated);
            }
            Err(err) => {
                self.view.show_modal(&Notice::error(err.to_string()));
                return Err(err);
            }
        };

        let message = ExtensionMessage::ClaimUsername {
            username: username.to_string(),
            proof,
        };
        let response = match self.messenger.send_runtime(&message).await {
            Ok(response) => response,
            Err(err) => {
                log_link_failure(&err, "claimUsername");
                self.view.show_modal(&Notice::error(CLAIM_FAILED));
                return Err(ClaimError::Link(err));
            }
        };

        match response {
            Some(MessageResponse {
                success: true,
                result,
                ..
            }) => {
                self.finish_claim(username).await;
                Ok(result.unwrap_or(Value::Null))
            }
            other => {
                let error = other
                    .and_then(|response| response.error)
                    .unwrap_or_else(|| CLAIM_FAILED.to_string());
                tracing::warn!(%username, %error, "claim rejected.");
                self.view.show_modal(&Notice::error(error.clone()));
                Err(ClaimError::Rejected(error))
            }
        }
    }

    async fn claim_preconditions(&self) -> Result<ProofPayload, ClaimError> {
        let session = self.session.lock().await;
        if session.current_user.is_none() {
            return Err(ClaimError::Unauthenticated);
        }
        if session.reservations.is_empty() {
            return Err(ValidationError::MissingReservationCache.into());
        }
        match &session.proof {
            Some(proof) if proof.is_valid() => Ok(proof.clone()),
            _ => Err(ValidationError::InvalidProof.into()),
        }
    }

    async fn finish_claim(&self, username: &str) {
        tracing::info!(%username, "username claimed.");
        self.view
            .show_success(&format!("Successfully claimed {username}!"));

        if let Some(tab) = self.active_tab().await {
            let message = ExtensionMessage::ClaimSuccess {
                username: username.to_string(),
            };
            if let Err(err) = self.messenger.send_to_tab(tab.id, &message).await {
                log_link_failure(&err, "claimSuccess");
            }
        }

        self.view.close_claim_dialog();
        let mut session = self.session.lock().await;
        session.reservations.clear();
        session.proof = None;
        session.dialog_open = false;
    }

    pub async fn login(&self) {
        self.open_tab(&self.settings.login_url).await;
    }

    pub async fn access_hytale(&self) {
        self.open_tab(&self.settings.profiles_url).await;
    }

    async fn open_tab(&self, url: &str) {
        if let Err(err) = self.tabs.create(url).await {
            tracing::error!(%url, error = %err, "failed to open tab.");
        }
    }

    async fn active_tab(&self) -> Option<Tab> {
        match self.tabs.query_active().await {
            Ok(tabs) => tabs.into_iter().next(),
            Err(err) => {
                tracing::warn!(error = %err, "active tab query failed.");
                None
            }
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.current_user.is_some()
    }

    pub async fn dialog_open(&self) -> bool {
        self.session.lock().await.dialog_open
    }

    pub async fn cached_claim(&self) -> Option<PendingClaim> {
        let session = self.session.lock().await;
        if session.reservations.is_empty() {
            return None;
        }
        Some(PendingClaim {
            reservations: session.reservations.clone(),
            proof: session.proof.clone().unwrap_or_default(),
        })
    }
}

async fn poll_loop<M, T, S, V>(
    controller: Weak<ClaimUiController<M, T, S, V>>,
    delay: Duration,
    period: Duration,
) where
    M: Messenger + 'static,
    T: Tabs + 'static,
    S: KeyValueStorage + 'static,
    V: ClaimView + 'static,
{
    tokio::time::sleep(delay).await;
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        interval.tick().await;
        // Stop once the popup is gone.
        let Some(controller) = controller.upgrade() else {
            break;
        };
        let tab_url = controller.active_tab().await.and_then(|t| t.url);
        controller.check_auth(tab_url).await;
    }
}

#[async_trait]
impl<M, T, S, V> MessageHandler for ClaimUiController<M, T, S, V>
where
    M: Messenger + 'static,
    T: Tabs + 'static,
    S: KeyValueStorage + 'static,
    V: ClaimView + 'static,
{
    async fn handle(&self, message: ExtensionMessage) -> Option<MessageResponse> {
        if let ExtensionMessage::ShowClaimDialog {
            reservations,
            proof,
        } = message
        {
            self.on_show_claim_dialog(reservations, proof).await;
        }
        None
    }
}

/// Whether a tab shows the Hytale profiles page.
pub fn is_profiles_page(url: &str, profiles_host: &str) -> bool {
    let Ok(url) = Url::parse(url) else {
        return false;
    };
    url.host_str() == Some(profiles_host)
        && (url.path() == "/" || url.path().starts_with("/profiles"))
}

/// An open claim dialog stays on screen for as long as the user is signed in.
pub fn derive_section(on_profiles_page: bool, authenticated: bool, dialog_open: bool) -> Section {
    match (on_profiles_page, authenticated) {
        (_, true) if dialog_open => Section::ClaimDialogOpen,
        (false, _) => Section::HytaleAccessPrompt,
        (true, true) => Section::Authenticated,
        (true, false) => Section::AuthRequired,
    }
}

fn log_link_failure(err: &LinkError, action: &str) {
    if err.is_receiver_gone() {
        tracing::debug!(%action, error = %err, "no receiver for message.");
    } else {
        tracing::error!(%action, error = %err, "message failed.");
    }
}
