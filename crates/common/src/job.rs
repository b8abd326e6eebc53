//! Backup job model
//!
//! Desired state (`ResourceSpec`), authoritative remote state
//! (`RemoteResource`) and the fixed table translating local attribute names
//! into the REST API's field names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Pairing of a local attribute name with its REST API field name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub local: &'static str,
    pub wire: &'static str,
}

pub mod field {
    use super::Field;

    const fn same(name: &'static str) -> Field {
        Field {
            local: name,
            wire: name,
        }
    }

    pub const ID: Field = same("id");
    pub const NAME: Field = same("name");
    pub const TYPE: Field = same("type");
    pub const DESCRIPTION: Field = same("description");
    pub const IS_HIGH_PRIORITY: Field = Field {
        local: "is_high_priority",
        wire: "isHighPriority",
    };
    pub const VIRTUAL_MACHINES: Field = Field {
        local: "virtual_machines",
        wire: "virtualMachines",
    };
    pub const STORAGE: Field = same("storage");
    pub const GUEST_PROCESSING: Field = Field {
        local: "guest_processing",
        wire: "guestProcessing",
    };
    pub const SCHEDULE: Field = same("schedule");
}

/// Job attributes renamed between local and wire form. `id` is handled
/// separately since it is only sent on update.
pub const FIELD_MAP: [Field; 8] = [
    field::NAME,
    field::TYPE,
    field::DESCRIPTION,
    field::IS_HIGH_PRIORITY,
    field::VIRTUAL_MACHINES,
    field::STORAGE,
    field::GUEST_PROCESSING,
    field::SCHEDULE,
];

/// Remote job identifier, assigned by the server at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap a server-assigned id. Empty ids are rejected.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() {
            None
        } else {
            Some(Self(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job type accepted by the backup server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    Backup,
    VSphereReplica,
    CloudDirectorBackup,
    #[serde(rename = "EntraIDTenantBackup")]
    EntraIdTenantBackup,
    #[serde(rename = "EntraIDAuditLogBackup")]
    EntraIdAuditLogBackup,
    FileBackupCopy,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::Backup,
        JobType::VSphereReplica,
        JobType::CloudDirectorBackup,
        JobType::EntraIdTenantBackup,
        JobType::EntraIdAuditLogBackup,
        JobType::FileBackupCopy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Backup => "Backup",
            JobType::VSphereReplica => "VSphereReplica",
            JobType::CloudDirectorBackup => "CloudDirectorBackup",
            JobType::EntraIdTenantBackup => "EntraIDTenantBackup",
            JobType::EntraIdAuditLogBackup => "EntraIDAuditLogBackup",
            JobType::FileBackupCopy => "FileBackupCopy",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = Error;

    /// Matching is case-sensitive, as the server's is.
    fn from_str(s: &str) -> Result<Self> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = JobType::ALL.iter().map(|t| t.as_str()).collect();
                Error::validation(format!(
                    "unknown job type {:?}, expected one of: {}",
                    s,
                    allowed.join(", ")
                ))
            })
    }
}

/// Virtual machine selection rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachines {
    /// Inventory objects to protect
    pub includes: Vec<Value>,

    /// Exclusion rules, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excludes: Option<Map<String, Value>>,
}

/// Desired state of a job as declared by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: JobType,

    pub description: String,

    #[serde(default)]
    pub is_high_priority: bool,

    pub virtual_machines: VirtualMachines,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_processing: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Map<String, Value>>,
}

impl ResourceSpec {
    /// Minimal spec with no optional sections
    pub fn new(name: impl Into<String>, kind: JobType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            is_high_priority: false,
            virtual_machines: VirtualMachines::default(),
            storage: None,
            guest_processing: None,
            schedule: None,
        }
    }

    /// Checks that cannot be expressed in the type itself
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name must not be empty"));
        }
        Ok(())
    }

    /// Build the request body, embedding `id` when given.
    ///
    /// Top-level keys are renamed through [`FIELD_MAP`]. Unset optional
    /// sections are left out; nested values are sent as declared.
    pub fn to_wire(&self, id: Option<&JobId>) -> Result<Map<String, Value>> {
        let local = serde_json::to_value(self)?;

        let mut payload = Map::new();
        if let Some(id) = id {
            payload.insert(field::ID.wire.to_string(), Value::String(id.to_string()));
        }
        for f in FIELD_MAP {
            if let Some(value) = local.get(f.local) {
                payload.insert(f.wire.to_string(), value.clone());
            }
        }
        Ok(payload)
    }
}

/// Job state as last reported by the server
///
/// Serializes with local attribute names so a snapshot can be stored by the
/// host as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub id: JobId,

    #[serde(default)]
    pub name: String,

    /// Kept as reported so a value outside `JobType` still shows up as drift
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub is_high_priority: bool,

    /// Kept whole so nested keys the server adds are not lost
    #[serde(default)]
    pub virtual_machines: Map<String, Value>,

    pub storage: Option<Map<String, Value>>,

    pub guest_processing: Option<Map<String, Value>>,

    pub schedule: Option<Map<String, Value>>,
}

impl RemoteResource {
    /// Decode a job from a REST response body.
    ///
    /// Only `id` is mandatory. Absent or null attributes fall back to empty
    /// values; attributes of the wrong shape are rejected.
    pub fn from_wire(body: &Value) -> std::result::Result<Self, String> {
        let obj = body
            .as_object()
            .ok_or_else(|| "response body is not a JSON object".to_string())?;

        let id = obj
            .get(field::ID.wire)
            .and_then(Value::as_str)
            .and_then(JobId::new)
            .ok_or_else(|| "response body has no job id".to_string())?;

        let mut local = Map::new();
        local.insert(field::ID.local.to_string(), Value::String(id.to_string()));
        for f in FIELD_MAP {
            match obj.get(f.wire) {
                None | Some(Value::Null) => {}
                Some(value) => {
                    local.insert(f.local.to_string(), value.clone());
                }
            }
        }

        serde_json::from_value(Value::Object(local))
            .map_err(|e| format!("unexpected job {} in response: {}", id, e))
    }
}
