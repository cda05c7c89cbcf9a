// Presentation states shared by the popup and the page affordance.

/// Popup section currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Loading,
    AuthRequired,
    HytaleAccessPrompt,
    Authenticated,
    ClaimDialogOpen,
}

/// State of the claim button injected into the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Idle,
    Loading,
    Claimed,
}

/// Blocking modal with a title and a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn login_required() -> Self {
        Self::new(
            "Authentication Required",
            "Please log in to TaleName via the extension popup first.",
        )
    }
}
