// Listener boundary: raw JSON in, typed handler, raw JSON out.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::domain::errors::ValidationError;
use crate::domain::messages::{DecodeError, MessageResponse, decode_message};
use crate::domain::ports::MessageHandler;
use crate::interface_adapters::host::MessageListener;

/// Adapts a typed [`MessageHandler`] to the host's raw listener interface.
pub struct RuntimeListener<T> {
    context: &'static str,
    handler: Arc<T>,
    // Whether malformed requests get a validation reply from this context.
    answers_invalid: bool,
}

impl<T> RuntimeListener<T>
where
    T: MessageHandler,
{
    pub fn new(context: &'static str, handler: Arc<T>) -> Self {
        Self {
            context,
            handler,
            answers_invalid: false,
        }
    }

    /// Reply to malformed request/response messages instead of ignoring them.
    pub fn answering_invalid(mut self) -> Self {
        self.answers_invalid = true;
        self
    }

    async fn dispatch(&self, raw: Value) -> Option<Value> {
        let reply = match decode_message(raw) {
            Ok(message) => self.handler.handle(message).await,
            Err(DecodeError::Invalid { action, reason })
                if self.answers_invalid && action.expects_reply() =>
            {
                tracing::warn!(%action, %reason, "rejected malformed message.");
                Some(MessageResponse::failure(
                    ValidationError::InvalidMessage(reason).to_string(),
                ))
            }
            Err(err) => {
                tracing::debug!(error = %err, "ignored message.");
                None
            }
        }?;

        match serde_json::to_value(&reply) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::error!(error = %err, "failed to encode reply.");
                Some(serde_json::json!({ "success": false, "error": err.to_string() }))
            }
        }
    }
}

#[async_trait]
impl<T> MessageListener for RuntimeListener<T>
where
    T: MessageHandler + 'static,
{
    async fn on_message(&self, message: Value) -> Option<Value> {
        // Correlates every log line of one delivery.
        let request_id = Uuid::new_v4();
        let span = info_span!("message", context = self.context, %request_id);
        self.dispatch(message).instrument(span).await
    }
}
