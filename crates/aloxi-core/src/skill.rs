//! Skill request/response forms.
//!
//! Requests arrive already decoded from the voice-assistant schema; only the
//! fields the bridge acts on are kept. Replies are plain JSON objects, and an
//! empty object is a valid reply: the skill host expects *some* answer for
//! every request, including ones the bridge does not implement.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Decoded control request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRequest {
    /// Request name, e.g. `TurnOnRequest`.
    pub name: String,
    /// Caller correlation id, echoed in bus replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appliance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

impl SkillRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message_id: None,
            appliance_id: None,
            percentage: None,
        }
    }

    pub fn for_appliance(mut self, id: impl Into<String>) -> Self {
        self.appliance_id = Some(id.into());
        self
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.percentage = Some(percentage);
        self
    }

    pub fn kind(&self) -> RequestKind {
        RequestKind::from_name(&self.name)
    }
}

/// Classification of request names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    TurnOn,
    TurnOff,
    SetPercentage,
    /// Known to the skill, not implemented by the bridge.
    Unsupported,
    /// Not a name the skill defines.
    Unknown,
}

impl RequestKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "TurnOnRequest" => RequestKind::TurnOn,
            "TurnOffRequest" => RequestKind::TurnOff,
            "SetPercentageRequest" => RequestKind::SetPercentage,
            "DiscoverAppliancesRequest"
            | "IncrementPercentageRequest"
            | "DecrementPercentageRequest" => RequestKind::Unsupported,
            _ => RequestKind::Unknown,
        }
    }
}

/// Reply object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillResponse(pub Map<String, Value>);

impl SkillResponse {
    /// Neutral reply: `{}`.
    pub fn empty() -> Self {
        Self(Map::new())
    }

    /// `{"name": "<name>"}`.
    pub fn named(name: &str) -> Self {
        let mut map = Map::new();
        map.insert("name".into(), Value::String(name.to_string()));
        Self(map)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
