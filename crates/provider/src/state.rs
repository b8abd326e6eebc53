//! Host State Management
//!
//! Decoding of host state documents into typed job specs, and encoding of
//! server snapshots back into state documents. Documents use the local
//! (snake_case) attribute names and are exchanged as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use veeam_common::{field, Error, JobId, RemoteResource, ResourceSpec, Result};

/// Dynamic value as stored by the host
///
/// Maps are ordered so that encoding the same state always yields the same
/// bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum DynamicValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<DynamicValue>),
    Map(BTreeMap<String, DynamicValue>),
}

impl DynamicValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, DynamicValue>> {
        match self {
            DynamicValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_map()?.get(key)
    }
}

/// Decode a state document from JSON bytes. Empty input is a null state.
pub fn decode_dynamic_value(data: &[u8]) -> Result<DynamicValue> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(DynamicValue::Null);
    }
    Ok(serde_json::from_slice(data)?)
}

/// Encode a state document as JSON bytes
pub fn encode_dynamic_value(value: &DynamicValue) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Helper to extract an optional non-empty string attribute
pub fn get_optional_string_attr(value: &DynamicValue, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(DynamicValue::as_string)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Create a DynamicValue map with the given attributes
pub fn make_state(attrs: Vec<(&str, DynamicValue)>) -> DynamicValue {
    DynamicValue::Map(
        attrs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

/// Create a string DynamicValue
pub fn string_value(s: impl Into<String>) -> DynamicValue {
    DynamicValue::String(s.into())
}

/// Job id recorded in a state document, if any
pub fn job_id_from_state(state: &DynamicValue) -> Option<JobId> {
    get_optional_string_attr(state, field::ID.local).and_then(JobId::new)
}

/// Decode desired state into a validated job spec.
///
/// The `id` attribute and null-valued attributes are ignored, so a stored
/// state document can be fed back in as desired state. Unknown attributes,
/// missing required attributes and job types outside the known set are
/// rejected.
pub fn spec_from_state(state: &DynamicValue) -> Result<ResourceSpec> {
    let attrs = state
        .as_map()
        .ok_or_else(|| Error::validation("job configuration must be an object"))?;

    let filtered: BTreeMap<&String, &DynamicValue> = attrs
        .iter()
        .filter(|(key, value)| key.as_str() != field::ID.local && !value.is_null())
        .collect();

    let doc = serde_json::to_value(&filtered)?;
    let spec: ResourceSpec =
        serde_json::from_value(doc).map_err(|e| Error::validation(e.to_string()))?;
    spec.validate()?;
    Ok(spec)
}

/// Encode a server snapshot as a state document, `id` included
pub fn state_from_remote(remote: &RemoteResource) -> Result<DynamicValue> {
    Ok(serde_json::from_value(serde_json::to_value(remote)?)?)
}
