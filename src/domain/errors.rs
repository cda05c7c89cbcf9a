use std::fmt;

// Reply text for dialog requests made without a session.
pub const NOT_AUTHENTICATED: &str = "Not authenticated";

// Host phrases meaning the other side of a message channel is gone
// (popup closed, tab navigated away, extension reloaded).
const RECEIVER_GONE_PHRASES: [&str; 3] = [
    "Could not establish connection",
    "Receiving end does not exist",
    "Extension context invalidated",
];

/// Failure reported by a raw host primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host error: {}", self.message)
    }
}

impl std::error::Error for HostError {}

/// Cross-context messaging failure, split by whether the counterpart is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    // Expected when the popup or page is not open; never logged as an error.
    ReceiverGone(String),
    Failed(String),
}

impl LinkError {
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if RECEIVER_GONE_PHRASES
            .iter()
            .any(|phrase| message.contains(phrase))
        {
            LinkError::ReceiverGone(message)
        } else {
            LinkError::Failed(message)
        }
    }

    pub fn is_receiver_gone(&self) -> bool {
        matches!(self, LinkError::ReceiverGone(_))
    }

    pub fn message(&self) -> &str {
        match self {
            LinkError::ReceiverGone(message) | LinkError::Failed(message) => message,
        }
    }
}

impl From<HostError> for LinkError {
    fn from(err: HostError) -> Self {
        LinkError::classify(err.message)
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::ReceiverGone(message) => write!(f, "receiver gone: {message}"),
            LinkError::Failed(message) => write!(f, "messaging failed: {message}"),
        }
    }
}

impl std::error::Error for LinkError {}

/// Backend call failure as seen by the use cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    Transport(String),
    // Non-2xx reply; message comes from the body or the status line.
    Upstream { status: u16, message: String },
    Decode(String),
}

impl RemoteError {
    // Text shown to the user and echoed in message replies.
    pub fn message(&self) -> &str {
        match self {
            RemoteError::Transport(message)
            | RemoteError::Upstream { message, .. }
            | RemoteError::Decode(message) => message,
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteError::Transport(message) => write!(f, "transport error: {message}"),
            RemoteError::Upstream { status, message } => {
                write!(f, "upstream error {status}: {message}")
            }
            RemoteError::Decode(message) => write!(f, "response decode error: {message}"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Payload rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    NoReservations,
    MissingReservationCache,
    InvalidProof,
    InvalidMessage(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NoReservations => write!(f, "No valid usernames found."),
            ValidationError::MissingReservationCache => write!(
                f,
                "Reservation data not available. Please try again from the Hytale page."
            ),
            ValidationError::InvalidProof => write!(
                f,
                "Proof data is invalid. Please try again from the Hytale page."
            ),
            ValidationError::InvalidMessage(reason) => write!(f, "invalid message: {reason}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Outcome of a failed claim attempt from the popup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    Unauthenticated,
    Validation(ValidationError),
    // Failure reported back by the coordinator.
    Rejected(String),
    Link(LinkError),
}

impl fmt::Display for ClaimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClaimError::Unauthenticated => write!(f, "{NOT_AUTHENTICATED}"),
            ClaimError::Validation(err) => write!(f, "{err}"),
            ClaimError::Rejected(message) => write!(f, "{message}"),
            ClaimError::Link(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ClaimError {}

impl From<ValidationError> for ClaimError {
    fn from(err: ValidationError) -> Self {
        ClaimError::Validation(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_message_mentions_missing_receiver_then_classified_as_receiver_gone() {
        let err = LinkError::classify(
            "Could not establish connection. Receiving end does not exist.",
        );

        assert!(err.is_receiver_gone());
    }

    #[test]
    fn when_context_is_invalidated_then_classified_as_receiver_gone() {
        assert!(LinkError::classify("Extension context invalidated.").is_receiver_gone());
    }

    #[test]
    fn when_message_is_unrelated_then_classified_as_failed() {
        let err = LinkError::classify("message too large");

        assert_eq!(err, LinkError::Failed("message too large".to_string()));
    }

    #[test]
    fn when_host_error_converts_then_classification_is_applied() {
        let err: LinkError = HostError::new("Receiving end does not exist").into();

        assert!(err.is_receiver_gone());
        assert_eq!(err.message(), "Receiving end does not exist");
    }
}
