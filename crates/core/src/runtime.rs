//! Runtime context — permissions, maps config, and location pushed by the
//! single authoritative reporter.

use serde::{Deserialize, Serialize};

/// Tri-state permission as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    #[default]
    Prompt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub microphone: PermissionState,
    #[serde(default)]
    pub location: PermissionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// The full runtime record. Replaced wholesale on every push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeContext {
    #[serde(default)]
    pub permissions: Permissions,

    /// Opaque maps provider configuration.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub maps_config: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,

    /// Opaque place records from the maps collaborator.
    #[serde(default)]
    pub nearby_places: Vec<serde_json::Value>,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_default_to_prompt() {
        let ctx = RuntimeContext::default();
        assert_eq!(ctx.permissions.microphone, PermissionState::Prompt);
        assert_eq!(ctx.permissions.location, PermissionState::Prompt);
    }

    #[test]
    fn parses_partial_payload() {
        let json = r#"{
            "permissions": {"location": "granted"},
            "location": {"latitude": 1.5, "longitude": 2.5},
            "reason": "boot"
        }"#;
        let ctx: RuntimeContext = serde_json::from_str(json).unwrap();
        assert_eq!(ctx.permissions.location, PermissionState::Granted);
        assert_eq!(ctx.permissions.microphone, PermissionState::Prompt);
        assert_eq!(ctx.location.map(|l| l.latitude), Some(1.5));
        assert!(ctx.nearby_places.is_empty());
    }
}
