//! Controller model document -> `Home`.
//!
//! Document shape (only the parts we read):
//!
//! ```json
//! {
//!   "rooms": { "<uuid>": { "name": "Kitchen" } },
//!   "cats":  { "<uuid>": { "name": "Lighting" } },
//!   "controls": {
//!     "<key>": { "name": "Ceiling", "type": "Switch", "uuidAction": "<id>",
//!                "room": "<uuid>", "cat": "<uuid>", "states": { "active": "<uuid>" } }
//!   }
//! }
//! ```
//!
//! Filters run in order: ignored category, ignored control, unsupported type.
//! A malformed entry is skipped on its own and never aborts the document.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AloxiError, Result};
use crate::model::{ControlKind, Device, Home};

/// Controller type name of a plain on/off switch.
const SWITCH_TYPE: &str = "Switch";

/// Configured exclusions.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    /// Category names to skip.
    pub categories: HashSet<String>,
    /// Control names or action ids to skip.
    pub controls: HashSet<String>,
}

impl IgnoreRules {
    pub fn new<C, K>(categories: C, controls: K) -> Self
    where
        C: IntoIterator<Item = String>,
        K: IntoIterator<Item = String>,
    {
        Self {
            categories: categories.into_iter().collect(),
            controls: controls.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    IgnoredCategory(String),
    IgnoredControl(String),
    UnsupportedType(String),
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    /// Key of the entry in the `controls` object.
    pub key: String,
    pub reason: SkipReason,
}

/// Outcome of one derivation pass.
#[derive(Debug, Clone)]
pub struct ParseReport {
    pub home: Home,
    pub skipped: Vec<SkippedEntry>,
}

impl ParseReport {
    /// Entries dropped because they could not be read.
    pub fn malformed(&self) -> usize {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Malformed(_)))
            .count()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawControl {
    name: String,
    #[serde(rename = "type")]
    control_type: String,
    uuid_action: String,
    #[serde(default)]
    room: Option<String>,
    #[serde(default)]
    cat: Option<String>,
    #[serde(default)]
    states: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

/// Parse a whole document. Fails only when the document itself is unusable.
pub fn parse_document(doc: &Value, rules: &IgnoreRules) -> Result<ParseReport> {
    let root = doc
        .as_object()
        .ok_or_else(|| AloxiError::Controller("model document is not an object".into()))?;

    let controls = root
        .get("controls")
        .and_then(Value::as_object)
        .ok_or_else(|| AloxiError::Controller("model document has no controls".into()))?;

    let rooms = name_index(root.get("rooms"));
    let cats = name_index(root.get("cats"));

    let mut devices = Vec::new();
    let mut skipped = Vec::new();

    for (key, entry) in controls {
        match convert(entry, &rooms, &cats, rules) {
            Ok(device) => devices.push(device),
            Err(reason) => {
                match &reason {
                    SkipReason::Malformed(why) => {
                        tracing::warn!(key = %key, reason = %why, "skipping malformed control");
                    }
                    other => {
                        tracing::debug!(key = %key, reason = ?other, "skipping control");
                    }
                }
                skipped.push(SkippedEntry {
                    key: key.clone(),
                    reason,
                });
            }
        }
    }

    Ok(ParseReport {
        home: Home::new(devices),
        skipped,
    })
}

fn convert(
    entry: &Value,
    rooms: &BTreeMap<String, String>,
    cats: &BTreeMap<String, String>,
    rules: &IgnoreRules,
) -> std::result::Result<Device, SkipReason> {
    let raw: RawControl = serde_json::from_value(entry.clone())
        .map_err(|e| SkipReason::Malformed(e.to_string()))?;

    let category = raw.cat.as_ref().and_then(|c| cats.get(c)).cloned();
    if let Some(cat) = &category {
        if rules.categories.contains(cat) {
            return Err(SkipReason::IgnoredCategory(cat.clone()));
        }
    }

    if rules.controls.contains(&raw.name) || rules.controls.contains(&raw.uuid_action) {
        return Err(SkipReason::IgnoredControl(raw.name));
    }

    let kind = match raw.control_type.as_str() {
        SWITCH_TYPE => ControlKind::Light,
        other => return Err(SkipReason::UnsupportedType(other.to_string())),
    };

    if raw.uuid_action.is_empty() {
        return Err(SkipReason::Malformed("empty uuidAction".into()));
    }

    let room = raw.room.as_ref().and_then(|r| rooms.get(r)).cloned();
    let display_name = match &room {
        Some(room) => format!("{} {}", room, raw.name),
        None => raw.name.clone(),
    };

    let states = raw
        .states
        .into_iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
        .collect();

    Ok(Device {
        kind,
        internal_name: raw.name,
        display_name,
        id: raw.uuid_action,
        room,
        category,
        states,
    })
}

fn name_index(section: Option<&Value>) -> BTreeMap<String, String> {
    let Some(map) = section.and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    names(map)
}

fn names(map: &Map<String, Value>) -> BTreeMap<String, String> {
    map.iter()
        .filter_map(|(id, v)| {
            serde_json::from_value::<Named>(v.clone())
                .ok()
                .map(|n| (id.clone(), n.name))
        })
        .collect()
}
