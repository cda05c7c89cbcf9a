use serde_json::{Map, Value};

use crate::domain::entities::{PendingClaim, ProofPayload, Session, UserProfile, lenient_records};
use crate::domain::errors::HostError;
use crate::domain::ports::KeyValueStorage;

pub const USER_KEY: &str = "user";
pub const AUTHENTICATED_KEY: &str = "authenticated";
pub const PENDING_RESERVATIONS_KEY: &str = "pendingReservations";
pub const PENDING_PROOF_KEY: &str = "pendingProof";

/// Typed view over the shared key-value storage.
///
/// Keys are flat and last-write-wins. Only the coordinator should write the
/// session keys; any context may write the pending claim, and the context
/// that renders it removes it.
#[derive(Clone)]
pub struct SessionStore<S> {
    storage: S,
}

impl<S> SessionStore<S>
where
    S: KeyValueStorage,
{
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub async fn load_session(&self) -> Result<Session, HostError> {
        let data = self.storage.get(&[USER_KEY, AUTHENTICATED_KEY]).await?;

        // A stored user that no longer decodes counts as no user.
        let user = data
            .get(USER_KEY)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok());
        let authenticated = data
            .get(AUTHENTICATED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Session {
            user,
            authenticated,
        })
    }

    pub async fn store_authenticated(&self, user: &UserProfile) -> Result<(), HostError> {
        let mut items = Map::new();
        items.insert(USER_KEY.to_string(), encode(user)?);
        items.insert(AUTHENTICATED_KEY.to_string(), Value::Bool(true));
        self.storage.set(items).await
    }

    // Replace the stored user without touching the authenticated flag.
    pub async fn refresh_user(&self, user: &UserProfile) -> Result<(), HostError> {
        let mut items = Map::new();
        items.insert(USER_KEY.to_string(), encode(user)?);
        self.storage.set(items).await
    }

    pub async fn clear_session(&self) -> Result<(), HostError> {
        self.storage.remove(&[USER_KEY, AUTHENTICATED_KEY]).await
    }

    pub async fn store_pending(&self, claim: &PendingClaim) -> Result<(), HostError> {
        let mut items = Map::new();
        items.insert(
            PENDING_RESERVATIONS_KEY.to_string(),
            encode(&claim.reservations)?,
        );
        items.insert(PENDING_PROOF_KEY.to_string(), encode(&claim.proof)?);
        self.storage.set(items).await
    }

    // Missing, malformed or empty reservations load as no pending claim.
    pub async fn load_pending(&self) -> Result<Option<PendingClaim>, HostError> {
        let mut data = self
            .storage
            .get(&[PENDING_RESERVATIONS_KEY, PENDING_PROOF_KEY])
            .await?;

        let reservations = match data.remove(PENDING_RESERVATIONS_KEY) {
            Some(value) => lenient_records(value).unwrap_or_default(),
            None => return Ok(None),
        };
        if reservations.is_empty() {
            return Ok(None);
        }

        // A missing proof still renders; the claim is refused later.
        let proof = data
            .remove(PENDING_PROOF_KEY)
            .and_then(|value| serde_json::from_value::<ProofPayload>(value).ok())
            .unwrap_or_default();

        Ok(Some(PendingClaim {
            reservations,
            proof,
        }))
    }

    pub async fn clear_pending(&self) -> Result<(), HostError> {
        self.storage
            .remove(&[PENDING_RESERVATIONS_KEY, PENDING_PROOF_KEY])
            .await
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, HostError> {
    serde_json::to_value(value).map_err(|err| HostError::new(err.to_string()))
}
