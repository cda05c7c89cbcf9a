// Content-script logic on the Hytale accounts page: passive detection,
// explicit claim requests and the claim button state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use crate::domain::entities::{ProofPayload, ProofSource, UsernameRecord};
use crate::domain::errors::{LinkError, RemoteError};
use crate::domain::messages::{ExtensionMessage, MessageResponse};
use crate::domain::ports::{Clock, MessageHandler, Messenger, PageAffordance, PageSource};
use crate::domain::ui::{ButtonState, Notice};

pub const RESERVATIONS_ENDPOINT: &str = "/api/account/username-reservations/list";
pub const GAME_PROFILES_ENDPOINT: &str = "/api/game-profile/list";

/// Settings for the page agent.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Host the agent is allowed to read from, subdomains included.
    pub target_host: String,
    /// How long the button shows `Claimed` before going back to idle.
    pub claimed_reset_delay: Duration,
}

/// A response observed on the page before the page consumes it.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub url: String,
    // Whether the request was sent with credentials included.
    pub credentialed: bool,
    pub ok: bool,
    pub body: Value,
}

/// How an explicit claim request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimRequestOutcome {
    WrongSite,
    InsecurePage,
    FetchFailed,
    NoUsernames,
    LoginRequired,
    SelectInPopup,
    // The background was unreachable; the button is reset without a notice.
    ReceiverGone,
}

impl ClaimRequestOutcome {
    pub fn notice(self, target_host: &str) -> Option<Notice> {
        let notice = match self {
            ClaimRequestOutcome::WrongSite => {
                Notice::error(format!("This extension only works on {target_host}"))
            }
            ClaimRequestOutcome::InsecurePage => {
                Notice::error("This extension requires a secure HTTPS connection")
            }
            ClaimRequestOutcome::FetchFailed => Notice::error(
                "Failed to fetch reservations from Hytale API. Please ensure you're logged in to Hytale and try refreshing the page.",
            ),
            ClaimRequestOutcome::NoUsernames => Notice::new(
                "No Usernames",
                "No reserved usernames or game profiles found. Please reserve a username on Hytale or create a game profile first.",
            ),
            ClaimRequestOutcome::LoginRequired => Notice::login_required(),
            ClaimRequestOutcome::SelectInPopup => Notice::new(
                "Select Username",
                "Please open the TaleName extension popup to select which username to claim.",
            ),
            ClaimRequestOutcome::ReceiverGone => return None,
        };
        Some(notice)
    }
}

/// Agent for one page load of the target site.
pub struct DetectionAgent<M, P, A, C> {
    settings: DetectionSettings,
    page_url: String,
    messenger: M,
    page: P,
    affordance: Arc<A>,
    clock: C,
    reset_task: Mutex<Option<JoinHandle<()>>>,
}

impl<M, P, A, C> DetectionAgent<M, P, A, C>
where
    M: Messenger,
    P: PageSource,
    A: PageAffordance + 'static,
    C: Clock,
{
    pub fn new(
        settings: DetectionSettings,
        page_url: impl Into<String>,
        messenger: M,
        page: P,
        affordance: Arc<A>,
        clock: C,
    ) -> Self {
        Self {
            settings,
            page_url: page_url.into(),
            messenger,
            page,
            affordance,
            clock,
            reset_task: Mutex::new(None),
        }
    }

    /// https and on the target host or one of its subdomains.
    pub fn is_trusted_url(&self, url: &str) -> bool {
        let Ok(url) = Url::parse(url) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        let target = self.settings.target_host.as_str();
        url.scheme() == "https"
            && (host == target
                || host
                    .strip_suffix(target)
                    .is_some_and(|prefix| prefix.ends_with('.')))
    }

    pub fn page_is_target(&self) -> bool {
        self.is_trusted_url(&self.page_url)
    }

    /// Inspect a response the page received and report usable records.
    pub async fn observe_response(&self, response: &InterceptedResponse) -> Option<ProofPayload> {
        if !self.page_is_target()
            || !self.is_trusted_url(&response.url)
            || !response.credentialed
            || !response.ok
        {
            return None;
        }

        let (records, source) = if response.url.contains(RESERVATIONS_ENDPOINT) {
            (normalize_reservations(&response.body), ProofSource::HytaleApi)
        } else if response.url.contains(GAME_PROFILES_ENDPOINT) {
            (
                normalize_game_profiles(&response.body),
                ProofSource::GameProfiles,
            )
        } else {
            return None;
        };
        if records.is_empty() {
            return None;
        }

        let proof = ProofPayload::new(records.clone(), source, self.clock.now_epoch_millis());
        tracing::info!(count = records.len(), ?source, "reservations detected.");

        let message = ExtensionMessage::ReservationsDetected {
            reservations: records,
            proof: proof.clone(),
        };
        if let Err(err) = self.messenger.send_runtime(&message).await {
            log_link_failure(&err, "reservationsDetected");
        }
        Some(proof)
    }

    /// The user pressed the claim button.
    #[tracing::instrument(name = "claim_request", skip_all)]
    pub async fn request_claim(&self) -> ClaimRequestOutcome {
        let outcome = match Url::parse(&self.page_url) {
            Ok(url) if url.host_str() != Some(self.settings.target_host.as_str()) => {
                ClaimRequestOutcome::WrongSite
            }
            Err(_) => ClaimRequestOutcome::WrongSite,
            Ok(url) if url.scheme() != "https" => ClaimRequestOutcome::InsecurePage,
            Ok(_) => {
                self.affordance.set_button(ButtonState::Loading);
                let outcome = self.collect_and_submit().await;
                self.affordance.set_button(ButtonState::Idle);
                outcome
            }
        };

        tracing::info!(?outcome, "claim request finished.");
        if let Some(notice) = outcome.notice(&self.settings.target_host) {
            self.affordance.show_modal(&notice);
        }
        outcome
    }

    async fn collect_and_submit(&self) -> ClaimRequestOutcome {
        let base = format!("https://{}", self.settings.target_host);

        let mut source = ProofSource::HytaleApi;
        let mut records = match self
            .page
            .fetch_json(&format!("{base}{RESERVATIONS_ENDPOINT}"))
            .await
        {
            Ok(body) => normalize_reservations(&body),
            // Non-2xx means no data, not a broken fetch.
            Err(RemoteError::Upstream { status, .. }) => {
                tracing::debug!(status, "reservations endpoint returned no data.");
                Vec::new()
            }
            Err(err) => {
                tracing::error!(error = %err, "reservations fetch failed.");
                return ClaimRequestOutcome::FetchFailed;
            }
        };

        if records.is_empty() {
            match self
                .page
                .fetch_json(&format!("{base}{GAME_PROFILES_ENDPOINT}"))
                .await
            {
                Ok(body) => {
                    records = normalize_game_profiles(&body);
                    source = ProofSource::GameProfiles;
                }
                Err(err) => tracing::error!(error = %err, "game profile fetch failed."),
            }
        }

        if records.is_empty() {
            records = self.page.page_records();
            source = ProofSource::GameProfilesDom;
        }
        if records.is_empty() {
            return ClaimRequestOutcome::NoUsernames;
        }

        let proof = ProofPayload::new(records.clone(), source, self.clock.now_epoch_millis());
        let message = ExtensionMessage::OpenClaimDialog {
            reservations: records,
            proof,
        };
        match self.messenger.send_runtime(&message).await {
            Ok(Some(MessageResponse { success: false, .. })) => ClaimRequestOutcome::LoginRequired,
            Ok(_) => ClaimRequestOutcome::SelectInPopup,
            Err(err) => {
                log_link_failure(&err, "openClaimDialog");
                if err.is_receiver_gone() {
                    ClaimRequestOutcome::ReceiverGone
                } else {
                    ClaimRequestOutcome::LoginRequired
                }
            }
        }
    }

    /// Echo from the popup after a claim went through.
    pub async fn on_claim_success(&self, username: &str) {
        tracing::info!(%username, "claim confirmed by popup.");
        self.affordance.set_button(ButtonState::Claimed);

        let affordance = Arc::clone(&self.affordance);
        let delay = self.settings.claimed_reset_delay;
        let mut task = self.reset_task.lock().await;
        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            affordance.set_button(ButtonState::Idle);
        }));
    }
}

#[async_trait]
impl<M, P, A, C> MessageHandler for DetectionAgent<M, P, A, C>
where
    M: Messenger,
    P: PageSource,
    A: PageAffordance + 'static,
    C: Clock,
{
    async fn handle(&self, message: ExtensionMessage) -> Option<MessageResponse> {
        if let ExtensionMessage::ClaimSuccess { username } = message {
            self.on_claim_success(&username).await;
        }
        None
    }
}

/// Reservation entries need a username and a `reservedUntil`.
pub fn normalize_reservations(body: &Value) -> Vec<UsernameRecord> {
    let Some(entries) = body.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let username = entry.get("username")?.as_str()?;
            let reserved_until = truthy_text(entry.get("reservedUntil")?)?;
            let mut record = UsernameRecord::new(username)?.with_reserved_until(reserved_until);
            record.uuid = string_field(entry, "uuid");
            Some(record)
        })
        .collect()
}

/// Game profiles are lowercased and trimmed; known optional fields are kept.
pub fn normalize_game_profiles(body: &Value) -> Vec<UsernameRecord> {
    let Some(entries) = body.as_array() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let username = entry.get("username")?.as_str()?;
            let mut record = UsernameRecord::new(username.trim().to_lowercase())?;
            record.uuid = string_field(entry, "uuid");
            record.created_at = string_field(entry, "createdAt");
            record.next_name_change_at = string_field(entry, "nextNameChangeAt");
            record.entitlements = entry.get("entitlements").and_then(Value::as_array).map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            });
            Some(record)
        })
        .collect()
}

fn string_field(entry: &Value, key: &str) -> Option<String> {
    entry
        .get(key)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// Any present, non-empty, non-zero value; non-strings keep their JSON text.
fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

fn log_link_failure(err: &LinkError, action: &str) {
    if err.is_receiver_gone() {
        tracing::debug!(%action, error = %err, "background unreachable.");
    } else {
        tracing::error!(%action, error = %err, "message failed.");
    }
}
