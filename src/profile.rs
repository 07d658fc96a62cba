//! Normalized user profile built from the Lidraughts account response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity fields extracted from a provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub profile_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub provider: String,
    pub id: String,
    pub username: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "profileUrl")]
    pub profile_url: String,
    /// Response body exactly as received.
    #[serde(rename = "_raw")]
    pub raw: String,
    #[serde(rename = "_json")]
    pub json: Value,
}

impl Profile {
    pub fn new(provider: impl Into<String>, identity: Identity, raw: String, json: Value) -> Self {
        let Identity {
            id,
            username,
            display_name,
            profile_url,
        } = identity;
        Self {
            provider: provider.into(),
            id,
            username,
            display_name,
            profile_url,
            raw,
            json,
        }
    }
}

/// Maps an account response onto [`Identity`].
///
/// Accepts both the normalized keys (`displayName`, `profileUrl`) and the
/// account API's own (`profile.firstName`/`lastName`, `url`). Absent fields
/// map to empty strings.
pub fn parse(json: &Value) -> Identity {
    let username = string_field(json, "username");
    let display_name = non_empty(string_field(json, "displayName"))
        .or_else(|| full_name(json))
        .unwrap_or_else(|| username.clone());
    let profile_url =
        non_empty(string_field(json, "profileUrl")).unwrap_or_else(|| string_field(json, "url"));

    Identity {
        id: string_field(json, "id"),
        username,
        display_name,
        profile_url,
    }
}

fn string_field(json: &Value, key: &str) -> String {
    match json.get(key) {
        Some(Value::String(value)) => value.clone(),
        Some(Value::Number(value)) => value.to_string(),
        _ => String::new(),
    }
}

fn full_name(json: &Value) -> Option<String> {
    let profile = json.get("profile")?;
    let parts: Vec<String> = ["firstName", "lastName"]
        .iter()
        .map(|key| string_field(profile, key))
        .filter(|part| !part.is_empty())
        .collect();
    non_empty(parts.join(" "))
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}
