//! Internal device model.
//!
//! A `Home` is an immutable snapshot derived in full from the controller's
//! model document. It is never patched in place; a reconciliation produces a
//! new `Home` that replaces the previous one wholesale.

pub mod document;

use std::collections::BTreeMap;

use serde::Serialize;

pub use document::{parse_document, IgnoreRules, ParseReport, SkipReason, SkippedEntry};

/// Control category understood by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlKind {
    Light,
}

/// One controllable device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub kind: ControlKind,
    /// Name as configured on the controller.
    pub internal_name: String,
    /// Name presented to the skill.
    pub display_name: String,
    /// Controller-assigned action identifier (identity).
    pub id: String,
    pub room: Option<String>,
    pub category: Option<String>,
    /// Logical state name -> controller identifier.
    pub states: BTreeMap<String, String>,
}

/// Ordered device snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Home {
    devices: Vec<Device>,
    revision: u64,
}

impl Home {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices, revision: 0 }
    }

    /// Same devices, stamped with the reconciliation counter.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn find(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }
}
