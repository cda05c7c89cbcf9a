// Headless renderers: what would be drawn is written to the log instead.

use crate::domain::entities::{UserProfile, UsernameRecord};
use crate::domain::ports::{ClaimView, PageAffordance};
use crate::domain::ui::{ButtonState, Notice, Section};

#[derive(Clone, Default)]
pub struct TracingView;

impl ClaimView for TracingView {
    fn show_section(&self, section: Section) {
        tracing::info!(?section, "popup section.");
    }

    fn show_user(&self, user: &UserProfile) {
        tracing::info!(
            username = %user.username,
            email = user.email.as_deref().unwrap_or("-"),
            "popup user."
        );
    }

    fn render_claim_dialog(&self, reservations: &[UsernameRecord]) {
        for record in reservations {
            tracing::info!(
                username = record.username(),
                reserved_until = record.reserved_until.as_deref().unwrap_or("N/A"),
                "claim candidate."
            );
        }
    }

    fn close_claim_dialog(&self) {
        tracing::info!("claim dialog closed.");
    }

    fn show_modal(&self, notice: &Notice) {
        tracing::warn!(title = %notice.title, message = %notice.message, "popup notice.");
    }

    fn show_success(&self, message: &str) {
        tracing::info!(%message, "popup success.");
    }
}

impl PageAffordance for TracingView {
    fn set_button(&self, state: ButtonState) {
        tracing::info!(?state, "claim button.");
    }

    fn show_modal(&self, notice: &Notice) {
        tracing::warn!(title = %notice.title, message = %notice.message, "page notice.");
    }
}
