use std::{env, path::PathBuf, time::Duration};

use crate::domain::ports::Cookie;
use crate::use_cases::{ClaimUiSettings, DetectionSettings};

// Runtime constants and environment lookups for the headless extension.

pub const CLAIMED_RESET_DELAY: Duration = Duration::from_secs(3);

pub fn api_base_url() -> String {
    env::var("TALENAME_API_URL").unwrap_or_else(|_| "https://api.talename.net".to_string())
}

pub fn cookie_domain() -> String {
    env::var("TALENAME_COOKIE_DOMAIN").unwrap_or_else(|_| "talename.net".to_string())
}

pub fn login_url() -> String {
    env::var("TALENAME_LOGIN_URL").unwrap_or_else(|_| "https://talename.net/login".to_string())
}

pub fn profiles_url() -> String {
    env::var("HYTALE_PROFILES_URL")
        .unwrap_or_else(|_| "https://accounts.hytale.com/profiles".to_string())
}

pub fn hytale_host() -> String {
    env::var("HYTALE_HOST").unwrap_or_else(|_| "accounts.hytale.com".to_string())
}

pub fn auth_poll_interval() -> Duration {
    millis_var("AUTH_POLL_INTERVAL_MS", 1000)
}

pub fn claim_dialog_recheck() -> Duration {
    millis_var("CLAIM_DIALOG_RECHECK_MS", 500)
}

pub fn api_timeout() -> Duration {
    millis_var("API_TIMEOUT_MS", 10_000)
}

// Unset means storage lives in memory only.
pub fn storage_path() -> Option<PathBuf> {
    env::var("TALENAME_STORAGE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

/// Session cookies to preload into the host cookie store.
pub fn seed_cookies() -> Vec<Cookie> {
    env::var("TALENAME_COOKIES")
        .map(|raw| parse_cookie_list(&raw, &cookie_domain()))
        .unwrap_or_default()
}

/// Everything the contexts need to be wired together.
#[derive(Debug, Clone)]
pub struct ExtensionSettings {
    pub api_base_url: String,
    pub cookie_domain: String,
    pub api_timeout: Duration,
    pub claim_ui: ClaimUiSettings,
    pub detection: DetectionSettings,
}

pub fn extension_settings() -> ExtensionSettings {
    ExtensionSettings {
        api_base_url: api_base_url(),
        cookie_domain: cookie_domain(),
        api_timeout: api_timeout(),
        claim_ui: claim_ui_settings(),
        detection: detection_settings(),
    }
}

pub fn claim_ui_settings() -> ClaimUiSettings {
    ClaimUiSettings {
        poll_interval: auth_poll_interval(),
        recheck_delay: claim_dialog_recheck(),
        profiles_host: hytale_host(),
        login_url: login_url(),
        profiles_url: profiles_url(),
    }
}

pub fn detection_settings() -> DetectionSettings {
    DetectionSettings {
        target_host: hytale_host(),
        claimed_reset_delay: CLAIMED_RESET_DELAY,
    }
}

/// Parse `name=value; other=value` into cookies scoped to `domain`.
///
/// Entries without a name are skipped; values keep any `=` they contain.
pub fn parse_cookie_list(raw: &str, domain: &str) -> Vec<Cookie> {
    raw.split(';')
        .filter_map(|entry| {
            let (name, value) = entry.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(Cookie {
                name: name.to_string(),
                value: value.trim().to_string(),
                domain: domain.to_string(),
            })
        })
        .collect()
}

fn millis_var(key: &str, default: u64) -> Duration {
    let millis = env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_millis(millis)
}
