// Domain layer: protocol types, errors and the ports the use cases depend on.

pub mod entities;
pub mod errors;
pub mod messages;
pub mod ports;
pub mod ui;

pub use entities::{
    AuthState, PendingClaim, ProofPayload, ProofSource, Session, UserProfile, UsernameRecord,
};
pub use errors::{ClaimError, HostError, LinkError, RemoteError, ValidationError};
pub use messages::{DecodeError, ExtensionMessage, MessageAction, MessageResponse, decode_message};
pub use ui::{ButtonState, Notice, Section};
