// Use cases layer: one workflow per extension context.

pub mod claim_ui;
pub mod coordinator;
pub mod detection;
pub mod session_store;

#[cfg(test)]
pub(crate) mod test_support;

pub use claim_ui::{ClaimUiController, ClaimUiSettings};
pub use coordinator::{Coordinator, NotifyOutcome};
pub use detection::{ClaimRequestOutcome, DetectionAgent, DetectionSettings, InterceptedResponse};
pub use session_store::SessionStore;
