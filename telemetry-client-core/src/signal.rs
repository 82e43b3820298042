//! Signal records and payload encoding
//!
//! A [`Signal`] is one telemetry event as it travels over the wire and as it is
//! stored in the on-disk snapshot. The JSON field names match the ingestion
//! API (`receivedAt`, `appID`, `clientUser`, `sessionID`, `type`, `payload`).
//!
//! ## Payload
//!
//! The payload is a flat list of `"key:value"` strings built from two sources:
//!
//! ```text
//! CommonContext (platform, locale, ...)  ─┐
//!                                         ├─ merge (caller wins) ─→ "key:value" list
//! caller-supplied pairs                  ─┘
//! ```
//!
//! Any `:` inside a key becomes `_` so the first `:` is always the separator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Caller-supplied key/value pairs. Ordered so encoding is deterministic.
pub type Payload = BTreeMap<String, String>;

/// One telemetry event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// Creation time of the signal, not send time
    pub received_at: DateTime<Utc>,

    /// Application the signal belongs to
    #[serde(rename = "appID")]
    pub app_id: Uuid,

    /// SHA-256 hex digest of the user identifier
    pub client_user: String,

    /// Identifier of the current app run
    #[serde(rename = "sessionID")]
    pub session_id: String,

    /// Event name
    #[serde(rename = "type")]
    pub signal_type: String,

    /// Encoded `"key:value"` entries
    pub payload: Vec<String>,
}

impl Signal {
    /// Create a signal stamped with the current time
    pub fn new(
        app_id: Uuid,
        client_user: impl Into<String>,
        session_id: impl Into<String>,
        signal_type: impl Into<String>,
        payload: Vec<String>,
    ) -> Self {
        Self {
            received_at: Utc::now(),
            app_id,
            client_user: client_user.into(),
            session_id: session_id.into(),
            signal_type: signal_type.into(),
            payload,
        }
    }
}

/// Values attached to every signal describing the running host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonContext {
    pub platform: String,
    pub architecture: String,
    pub operating_system_family: String,
    /// Name and version of the OS, e.g. `Ubuntu 24.04.1 LTS`
    pub operating_system: String,
    /// Hardware model, when the host exposes one
    pub model_name: String,
    pub app_version: String,
    pub is_debug: bool,
    pub locale: String,
    pub telemetry_client_version: String,
}

impl CommonContext {
    /// Probe the current process for context values
    pub fn detect(app_version: Option<&str>) -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            operating_system_family: std::env::consts::FAMILY.to_string(),
            operating_system: detect_operating_system(),
            model_name: detect_model_name(),
            app_version: app_version.unwrap_or("unknown").to_string(),
            is_debug: cfg!(debug_assertions),
            locale: detect_locale(),
            telemetry_client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Context as payload pairs
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("platform".to_string(), self.platform.clone());
        payload.insert("architecture".to_string(), self.architecture.clone());
        payload.insert(
            "operatingSystemFamily".to_string(),
            self.operating_system_family.clone(),
        );
        payload.insert(
            "operatingSystem".to_string(),
            self.operating_system.clone(),
        );
        payload.insert("modelName".to_string(), self.model_name.clone());
        payload.insert("appVersion".to_string(), self.app_version.clone());
        payload.insert("isDebug".to_string(), self.is_debug.to_string());
        payload.insert("locale".to_string(), self.locale.clone());
        payload.insert(
            "telemetryClientVersion".to_string(),
            self.telemetry_client_version.clone(),
        );
        payload
    }

    /// Merge caller pairs over the common context; caller pairs win.
    pub fn merge(&self, additional: Option<&Payload>) -> Payload {
        let mut payload = self.to_payload();
        if let Some(additional) = additional {
            for (key, value) in additional {
                payload.insert(key.clone(), value.clone());
            }
        }
        payload
    }

    /// Identifier used when neither the caller nor the config names a user
    pub fn fallback_user(&self) -> String {
        format!(
            "unknown user {} {} {}",
            self.platform, self.architecture, self.app_version
        )
    }
}

/// Locale from the POSIX environment, e.g. `en_US.UTF-8` becomes `en_US`
fn detect_locale() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .map(|value| {
            value
                .split(['.', '@'])
                .next()
                .unwrap_or_default()
                .to_string()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(target_os = "linux")]
fn detect_operating_system() -> String {
    std::fs::read_to_string("/etc/os-release")
        .ok()
        .and_then(|data| parse_os_release(&data))
        .unwrap_or_else(|| std::env::consts::OS.to_string())
}

#[cfg(not(target_os = "linux"))]
fn detect_operating_system() -> String {
    std::env::consts::OS.to_string()
}

#[cfg(target_os = "linux")]
fn detect_model_name() -> String {
    std::fs::read_to_string("/sys/devices/virtual/dmi/id/product_name")
        .ok()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(not(target_os = "linux"))]
fn detect_model_name() -> String {
    "unknown".to_string()
}

/// `PRETTY_NAME`, else `NAME VERSION_ID`, from os-release content
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_os_release(data: &str) -> Option<String> {
    let field = |key: &str| {
        data.lines().find_map(|line| {
            let value = line.strip_prefix(key)?.strip_prefix('=')?;
            let value = value.trim().trim_matches('"').trim();
            (!value.is_empty()).then(|| value.to_string())
        })
    };

    field("PRETTY_NAME").or_else(|| {
        let name = field("NAME")?;
        Some(match field("VERSION_ID") {
            Some(version) => format!("{} {}", name, version),
            None => name,
        })
    })
}

/// Replace `:` in a payload key so the separator stays unambiguous
pub fn sanitize_key(key: &str) -> String {
    key.replace(':', "_")
}

/// Encode payload pairs as `"key:value"` strings
pub fn encode_payload(payload: &Payload) -> Vec<String> {
    payload
        .iter()
        .map(|(key, value)| format!("{}:{}", sanitize_key(key), value))
        .collect()
}

/// One-way hash of a user identifier (64-char lowercase hex SHA-256)
pub fn hash_user(identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hex::encode(hasher.finalize())
}
