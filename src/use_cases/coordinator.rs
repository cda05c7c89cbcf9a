// Background message router: owns the session and proxies backend calls.

use async_trait::async_trait;

use crate::domain::entities::{AuthState, PendingClaim, ProofPayload, UsernameRecord};
use crate::domain::errors::{LinkError, NOT_AUTHENTICATED, ValidationError};
use crate::domain::messages::{ExtensionMessage, MessageResponse};
use crate::domain::ports::{KeyValueStorage, MessageHandler, Messenger, UsernameBackend};
use crate::use_cases::session_store::SessionStore;

/// Result of pushing a claim dialog to the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    // No popup was open to receive it.
    ReceiverAbsent,
    Failed(String),
}

/// Coordinator use case with injected dependencies.
pub struct Coordinator<B, S, M> {
    pub backend: B,
    pub store: SessionStore<S>,
    pub messenger: M,
}

impl<B, S, M> Coordinator<B, S, M>
where
    B: UsernameBackend,
    S: KeyValueStorage,
    M: Messenger,
{
    pub fn new(backend: B, store: SessionStore<S>, messenger: M) -> Self {
        Self {
            backend,
            store,
            messenger,
        }
    }

    // Route a message to its handler. None means the sender gets no reply.
    #[tracing::instrument(name = "coordinator", skip_all, fields(action = %message.action()))]
    pub async fn dispatch(&self, message: ExtensionMessage) -> Option<MessageResponse> {
        tracing::debug!("message received");
        match message {
            ExtensionMessage::GetUser => Some(self.get_user().await),
            ExtensionMessage::ClaimUsername { username, proof } => {
                Some(self.claim_username(&username, &proof).await)
            }
            ExtensionMessage::OpenClaimDialog {
                reservations,
                proof,
            } => Some(self.open_claim_dialog(reservations, proof).await),
            ExtensionMessage::ReservationsDetected {
                reservations,
                proof,
            } => {
                self.reservations_detected(reservations, proof).await;
                None
            }
            // Addressed to the popup and the page, not to us.
            ExtensionMessage::ShowClaimDialog { .. } | ExtensionMessage::ClaimSuccess { .. } => {
                None
            }
        }
    }

    pub async fn get_user(&self) -> MessageResponse {
        match self.backend.current_user().await {
            Ok(user) => {
                tracing::info!(username = %user.username, "session validated.");
                if let Err(e) = self.store.store_authenticated(&user).await {
                    tracing::error!(error = %e, "failed to persist session.");
                }
                MessageResponse::with_user(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "session check failed.");
                if let Err(e) = self.store.clear_session().await {
                    tracing::error!(error = %e, "failed to clear session.");
                }
                MessageResponse::soft_failure()
            }
        }
    }

    pub async fn claim_username(&self, username: &str, proof: &ProofPayload) -> MessageResponse {
        // Reject before touching the network.
        if username.trim().is_empty() {
            return MessageResponse::failure(
                ValidationError::InvalidMessage("username is required".to_string()).to_string(),
            );
        }
        if !proof.is_valid() {
            return MessageResponse::failure(ValidationError::InvalidProof.to_string());
        }

        match self.backend.claim_username(username, proof).await {
            Ok(result) => {
                tracing::info!(%username, "username claimed.");
                MessageResponse::with_result(result)
            }
            Err(e) => {
                tracing::warn!(%username, error = %e, "claim failed.");
                MessageResponse::failure(e.message())
            }
        }
    }

    pub async fn open_claim_dialog(
        &self,
        reservations: Vec<UsernameRecord>,
        proof: ProofPayload,
    ) -> MessageResponse {
        let session = match self.store.load_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "failed to read session.");
                return MessageResponse::failure(e.to_string());
            }
        };

        if let AuthState::Unauthenticated = AuthState::from(session) {
            tracing::info!("claim dialog requested without a session.");
            return MessageResponse::failure(NOT_AUTHENTICATED);
        }
        if reservations.is_empty() {
            return MessageResponse::failure(ValidationError::NoReservations.to_string());
        }

        let claim = PendingClaim {
            reservations,
            proof,
        };
        if let Err(e) = self.store.store_pending(&claim).await {
            tracing::error!(error = %e, "failed to persist pending claim.");
        }

        // The page is answered whether or not a popup was listening.
        let outcome = self.notify_claim_dialog(claim).await;
        tracing::debug!(?outcome, "claim dialog notify finished.");

        MessageResponse::ok()
    }

    pub async fn reservations_detected(&self, reservations: Vec<UsernameRecord>, proof: ProofPayload) {
        // A detection with nothing usable still replaces the previous one.
        if reservations.is_empty() {
            tracing::debug!("detection carried no usable records.");
            if let Err(e) = self.store.clear_pending().await {
                tracing::error!(error = %e, "failed to clear pending claim.");
            }
            return;
        }

        let count = reservations.len();
        let claim = PendingClaim {
            reservations,
            proof,
        };
        match self.store.store_pending(&claim).await {
            Ok(()) => tracing::info!(count, "pending claim stored."),
            Err(e) => tracing::error!(error = %e, "failed to persist pending claim."),
        }
    }

    // Best-effort push to an open popup.
    pub async fn notify_claim_dialog(&self, claim: PendingClaim) -> NotifyOutcome {
        let message = ExtensionMessage::ShowClaimDialog {
            reservations: claim.reservations,
            proof: Some(claim.proof),
        };

        match self.messenger.send_runtime(&message).await {
            Ok(_) => NotifyOutcome::Delivered,
            Err(LinkError::ReceiverGone(_)) => NotifyOutcome::ReceiverAbsent,
            Err(LinkError::Failed(reason)) => {
                tracing::warn!(error = %reason, "could not send showClaimDialog.");
                NotifyOutcome::Failed(reason)
            }
        }
    }

    // Runs on extension install/startup.
    pub async fn revalidate_session(&self) {
        let session = match self.store.load_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "failed to read session on startup.");
                return;
            }
        };
        if !session.authenticated {
            return;
        }

        match self.backend.current_user().await {
            Ok(user) => {
                tracing::info!(username = %user.username, "stored session still valid.");
                if let Err(e) = self.store.refresh_user(&user).await {
                    tracing::error!(error = %e, "failed to refresh stored user.");
                }
            }
            Err(e) => {
                tracing::info!(error = %e, "stored session expired.");
                if let Err(e) = self.store.clear_session().await {
                    tracing::error!(error = %e, "failed to clear session.");
                }
            }
        }
    }
}

#[async_trait]
impl<B, S, M> MessageHandler for Coordinator<B, S, M>
where
    B: UsernameBackend,
    S: KeyValueStorage,
    M: Messenger,
{
    async fn handle(&self, message: ExtensionMessage) -> Option<MessageResponse> {
        self.dispatch(message).await
    }
}
