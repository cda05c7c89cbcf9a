// Cross-context message protocol shared by the page, background and popup.
// The serialization within this layer is a dependency leak, but it keeps the
// wire contract next to the types it describes.

use crate::domain::entities::{ProofPayload, UserProfile, UsernameRecord, lenient_records};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Every message kind exchanged between extension contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ExtensionMessage {
    // Popup -> background: who is logged in.
    GetUser,
    // Popup -> background: claim one username with its proof.
    ClaimUsername {
        username: String,
        proof: ProofPayload,
    },
    // Page -> background: user pressed the claim button.
    OpenClaimDialog {
        #[serde(default, deserialize_with = "lenient_records")]
        reservations: Vec<UsernameRecord>,
        proof: ProofPayload,
    },
    // Page -> background: records seen in intercepted traffic.
    ReservationsDetected {
        #[serde(default, deserialize_with = "lenient_records")]
        reservations: Vec<UsernameRecord>,
        proof: ProofPayload,
    },
    // Background -> popup: render a claim dialog now.
    ShowClaimDialog {
        #[serde(default, deserialize_with = "lenient_records")]
        reservations: Vec<UsernameRecord>,
        #[serde(default, alias = "proofData")]
        proof: Option<ProofPayload>,
    },
    // Popup -> page: a claim went through.
    ClaimSuccess { username: String },
}

impl ExtensionMessage {
    pub fn action(&self) -> MessageAction {
        match self {
            ExtensionMessage::GetUser => MessageAction::GetUser,
            ExtensionMessage::ClaimUsername { .. } => MessageAction::ClaimUsername,
            ExtensionMessage::OpenClaimDialog { .. } => MessageAction::OpenClaimDialog,
            ExtensionMessage::ReservationsDetected { .. } => MessageAction::ReservationsDetected,
            ExtensionMessage::ShowClaimDialog { .. } => MessageAction::ShowClaimDialog,
            ExtensionMessage::ClaimSuccess { .. } => MessageAction::ClaimSuccess,
        }
    }
}

/// Message kind without payload, used for routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    GetUser,
    ClaimUsername,
    OpenClaimDialog,
    ReservationsDetected,
    ShowClaimDialog,
    ClaimSuccess,
}

impl MessageAction {
    const ALL: [MessageAction; 6] = [
        MessageAction::GetUser,
        MessageAction::ClaimUsername,
        MessageAction::OpenClaimDialog,
        MessageAction::ReservationsDetected,
        MessageAction::ShowClaimDialog,
        MessageAction::ClaimSuccess,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MessageAction::GetUser => "getUser",
            MessageAction::ClaimUsername => "claimUsername",
            MessageAction::OpenClaimDialog => "openClaimDialog",
            MessageAction::ReservationsDetected => "reservationsDetected",
            MessageAction::ShowClaimDialog => "showClaimDialog",
            MessageAction::ClaimSuccess => "claimSuccess",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.name() == name)
    }

    // Whether the sender waits for a reply.
    pub fn expects_reply(self) -> bool {
        matches!(
            self,
            MessageAction::GetUser | MessageAction::ClaimUsername | MessageAction::OpenClaimDialog
        )
    }
}

impl fmt::Display for MessageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reply envelope shared by every request/response action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn with_user(user: UserProfile) -> Self {
        Self {
            success: true,
            user: Some(user),
            ..Default::default()
        }
    }

    pub fn with_result(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    // Failure without detail, used when the reason is not the caller's concern.
    pub fn soft_failure() -> Self {
        Self::default()
    }
}

/// Why a raw message could not be turned into an `ExtensionMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    MissingAction,
    UnknownAction(String),
    Invalid {
        action: MessageAction,
        reason: String,
    },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingAction => write!(f, "message has no action"),
            DecodeError::UnknownAction(action) => write!(f, "unknown action {action}"),
            DecodeError::Invalid { action, reason } => write!(f, "invalid {action}: {reason}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a raw message, telling unknown actions apart from malformed payloads.
pub fn decode_message(raw: Value) -> Result<ExtensionMessage, DecodeError> {
    let action = raw
        .get("action")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingAction)?;
    let action = MessageAction::from_name(action)
        .ok_or_else(|| DecodeError::UnknownAction(action.to_string()))?;

    serde_json::from_value(raw).map_err(|err| DecodeError::Invalid {
        action,
        reason: err.to_string(),
    })
}
