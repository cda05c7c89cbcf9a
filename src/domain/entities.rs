use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A username candidate detected on the source site.
///
/// Reservation records and game-profile records are both normalized to this
/// shape. The username is never empty; deserialization rejects records that
/// would break that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawUsernameRecord")]
pub struct UsernameRecord {
    username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_until: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_name_change_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlements: Option<Vec<String>>,
}

impl UsernameRecord {
    // Returns None for blank usernames.
    pub fn new(username: impl Into<String>) -> Option<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return None;
        }
        Some(Self {
            username,
            reserved_until: None,
            uuid: None,
            created_at: None,
            next_name_change_at: None,
            entitlements: None,
        })
    }

    pub fn with_reserved_until(mut self, reserved_until: impl Into<String>) -> Self {
        self.reserved_until = Some(reserved_until.into());
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

// Wire shape accepted before the username invariant is checked.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUsernameRecord {
    username: String,
    reserved_until: Option<String>,
    uuid: Option<String>,
    created_at: Option<String>,
    next_name_change_at: Option<String>,
    entitlements: Option<Vec<String>>,
}

impl TryFrom<RawUsernameRecord> for UsernameRecord {
    type Error = String;

    fn try_from(raw: RawUsernameRecord) -> Result<Self, Self::Error> {
        let mut record =
            UsernameRecord::new(raw.username).ok_or_else(|| "username is required".to_string())?;
        record.reserved_until = raw.reserved_until;
        record.uuid = raw.uuid;
        record.created_at = raw.created_at;
        record.next_name_change_at = raw.next_name_change_at;
        record.entitlements = raw.entitlements;
        Ok(record)
    }
}

// Decode a record list, dropping entries that are not well-formed records.
pub(crate) fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<UsernameRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

/// Where a set of records was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProofSource {
    HytaleApi,
    GameProfiles,
    GameProfilesDom,
}

/// Evidence sent along with a claim so the backend can check ownership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    #[serde(default, deserialize_with = "lenient_records")]
    pub reservations: Vec<UsernameRecord>,
    // Epoch millis at detection time. Required for a valid proof.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ProofSource>,
}

impl ProofPayload {
    pub fn new(reservations: Vec<UsernameRecord>, source: ProofSource, timestamp_ms: u64) -> Self {
        Self {
            reservations,
            timestamp: Some(timestamp_ms),
            source: Some(source),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.timestamp.is_some()
    }
}

/// TaleName account as returned by `/auth/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    // Remaining server fields, kept as-is when persisted.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            extra: Map::new(),
        }
    }
}

/// Persisted auth state shared by all contexts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<UserProfile>,
    pub authenticated: bool,
}

/// Auth state derived from a session.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated(UserProfile),
}

impl From<Session> for AuthState {
    fn from(session: Session) -> Self {
        // Both the flag and the user must be present.
        match (session.authenticated, session.user) {
            (true, Some(user)) => AuthState::Authenticated(user),
            _ => AuthState::Unauthenticated,
        }
    }
}

/// Claim candidate waiting for the popup to display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingClaim {
    pub reservations: Vec<UsernameRecord>,
    pub proof: ProofPayload,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn when_record_username_is_blank_then_deserialization_fails() {
        let result = serde_json::from_value::<UsernameRecord>(json!({ "username": "  " }));

        assert!(result.is_err());
    }

    #[test]
    fn when_record_list_has_malformed_entries_then_they_are_dropped() {
        let proof: ProofPayload = serde_json::from_value(json!({
            "reservations": [
                { "username": "foo", "reservedUntil": "2026-01-01T00:00:00Z" },
                { "username": "" },
                { "username": 42 },
                "bar",
                null,
                { "username": "baz" }
            ],
            "timestamp": 1000
        }))
        .expect("expected proof to decode");

        let names: Vec<&str> = proof.reservations.iter().map(|r| r.username()).collect();
        assert_eq!(names, vec!["foo", "baz"]);
        assert_eq!(
            proof.reservations[0].reserved_until.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[test]
    fn when_proof_has_no_timestamp_then_it_is_not_valid() {
        let proof: ProofPayload =
            serde_json::from_value(json!({ "source": "game-profiles-dom" })).expect("decodes");

        assert!(!proof.is_valid());
        assert_eq!(proof.source, Some(ProofSource::GameProfilesDom));
    }

    #[test]
    fn when_record_is_serialized_then_fields_use_camel_case_and_skip_absent() {
        let record = UsernameRecord::new("foo")
            .expect("valid username")
            .with_reserved_until("2026-01-01T00:00:00Z");

        let value = serde_json::to_value(&record).expect("serializes");

        assert_eq!(
            value,
            json!({ "username": "foo", "reservedUntil": "2026-01-01T00:00:00Z" })
        );
    }

    #[test]
    fn when_session_flag_is_set_without_user_then_state_is_unauthenticated() {
        let session = Session {
            user: None,
            authenticated: true,
        };

        assert_eq!(AuthState::from(session), AuthState::Unauthenticated);
    }

    #[test]
    fn when_user_profile_has_extra_fields_then_they_round_trip() {
        let raw = json!({ "username": "alice", "email": "a@example.com", "plan": "pro" });

        let user: UserProfile = serde_json::from_value(raw.clone()).expect("decodes");

        assert_eq!(user.extra.get("plan"), Some(&json!("pro")));
        assert_eq!(serde_json::to_value(&user).expect("serializes"), raw);
    }
}
