//! Typed array records
//!
//! Array responses are string-keyed JSON objects whose values are all strings.
//! Every record is translated here, once, into a typed struct; numeric fields
//! become `Option<f64>` where `None` means "absent or unparsable" and the
//! reason has already been logged.

use super::capacity::parse_capacity;
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A raw JSON object returned by the array
pub type RawRecord = Map<String, Value>;

// =============================================================================
// Field Access
// =============================================================================

/// Field accessor that knows which record it reads from, for log context
struct Fields<'a> {
    kind: &'static str,
    raw: &'a RawRecord,
}

impl<'a> Fields<'a> {
    fn new(kind: &'static str, raw: &'a RawRecord) -> Self {
        Self { kind, raw }
    }

    /// Field as text; numbers and booleans are stringified
    fn text(&self, key: &str) -> Option<String> {
        match self.raw.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn required(&self, key: &str) -> Result<String> {
        self.text(key).ok_or_else(|| Error::MissingField {
            record: self.kind.to_string(),
            field: key.to_string(),
        })
    }

    fn flag(&self, key: &str) -> bool {
        self.text(key).map(|v| v == "yes").unwrap_or(false)
    }

    /// Capacity field; absent fields stay silent, unparsable ones are logged
    fn capacity(&self, id: &str, key: &str) -> Option<f64> {
        let value = self.text(key)?;
        match parse_capacity(&value) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(record = self.kind, id, field = key, value = %value, "Unparsable capacity: {}", e);
                None
            }
        }
    }

    /// Like `capacity`, but an empty string means "not reported"
    fn optional_capacity(&self, id: &str, key: &str) -> Option<f64> {
        match self.text(key) {
            Some(v) if v.trim().is_empty() => None,
            Some(_) => self.capacity(id, key),
            None => None,
        }
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Pool state reported by the array
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolStatus {
    Online,
    Degraded,
    Offline,
    Other(String),
}

impl PoolStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "online" => PoolStatus::Online,
            "degraded" => PoolStatus::Degraded,
            "offline" => PoolStatus::Offline,
            other => PoolStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolStatus::Online => write!(f, "online"),
            PoolStatus::Degraded => write!(f, "degraded"),
            PoolStatus::Offline => write!(f, "offline"),
            PoolStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

/// One entry of `lsmdiskgrp`
#[derive(Debug, Clone, PartialEq)]
pub struct PoolRecord {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    pub status: PoolStatus,
    pub physical_capacity: Option<f64>,
    pub physical_free: Option<f64>,
    pub reclaimable: Option<f64>,
    pub virtual_capacity: Option<f64>,
    pub real_capacity: Option<f64>,
    pub logical_capacity: Option<f64>,
    pub logical_free: Option<f64>,
    pub data_reduction: bool,
    pub compression_active: bool,
    pub warning_threshold: Option<f64>,
    pub used_before_reduction: Option<f64>,
    pub used_after_reduction: Option<f64>,
    pub dedup_savings: Option<f64>,
    pub compression_uncompressed: Option<f64>,
    pub compression_compressed: Option<f64>,
}

impl PoolRecord {
    pub fn from_raw(raw: &RawRecord) -> Result<Self> {
        let f = Fields::new("pool", raw);
        let id = f.required("id")?;
        let name = f.required("name")?;
        let parent_id = f.text("parent_mdisk_grp_id").unwrap_or_else(|| {
            debug!(pool = %name, "No parent pool id reported, treating as root");
            id.clone()
        });

        Ok(Self {
            status: PoolStatus::parse(&f.text("status").unwrap_or_default()),
            physical_capacity: f.capacity(&id, "physical_capacity"),
            physical_free: f.capacity(&id, "physical_free_capacity"),
            reclaimable: f.capacity(&id, "reclaimable_capacity"),
            virtual_capacity: f.capacity(&id, "virtual_capacity"),
            real_capacity: f.capacity(&id, "real_capacity"),
            logical_capacity: f.capacity(&id, "capacity"),
            logical_free: f.capacity(&id, "free_capacity"),
            data_reduction: f.flag("data_reduction"),
            compression_active: f.flag("compression_active"),
            warning_threshold: f.capacity(&id, "warning"),
            used_before_reduction: f.capacity(&id, "used_capacity_before_reduction"),
            used_after_reduction: f.capacity(&id, "used_capacity_after_reduction"),
            dedup_savings: f.capacity(&id, "deduplication_capacity_saving"),
            compression_uncompressed: f.capacity(&id, "compression_uncompressed_capacity"),
            compression_compressed: f.capacity(&id, "compression_compressed_capacity"),
            id,
            name,
            parent_id,
        })
    }

    /// Root pools own physical accounting; children would double count
    pub fn is_root(&self) -> bool {
        self.parent_id == self.id
    }
}

// =============================================================================
// Disk
// =============================================================================

/// A pool member disk, merged from `lsmdisk` and `lsmdisk/<id>`
#[derive(Debug, Clone, PartialEq)]
pub struct DiskRecord {
    pub id: String,
    pub pool_name: String,
    /// Empty for internally attached disks
    pub controller_name: String,
    pub mode: String,
    pub physical_capacity: Option<f64>,
    pub physical_free: Option<f64>,
    /// `None` on disks without compression accounting
    pub effective_used: Option<f64>,
}

impl DiskRecord {
    /// Build from a list entry, overlaying the per-disk detail when present
    pub fn from_raw(entry: &RawRecord, detail: Option<&RawRecord>) -> Result<Self> {
        let list = Fields::new("disk", entry);
        let id = list.required("id")?;
        let detail = detail.map(|d| Fields::new("disk", d));

        let text = |key: &str| {
            detail
                .as_ref()
                .and_then(|d| d.text(key))
                .or_else(|| list.text(key))
        };
        let capacity = |key: &str| {
            detail
                .as_ref()
                .and_then(|d| d.optional_capacity(&id, key))
                .or_else(|| list.optional_capacity(&id, key))
        };

        Ok(Self {
            pool_name: text("mdisk_grp_name").unwrap_or_default(),
            controller_name: text("controller_name").unwrap_or_default(),
            mode: text("mode").unwrap_or_default(),
            physical_capacity: capacity("physical_capacity"),
            physical_free: capacity("physical_free_capacity"),
            effective_used: capacity("effective_used_capacity"),
            id,
        })
    }

    pub fn is_internal(&self) -> bool {
        self.controller_name.trim().is_empty()
    }

    pub fn is_array_mode(&self) -> bool {
        self.mode == "array"
    }

    pub fn supports_compression_accounting(&self) -> bool {
        self.effective_used.is_some()
    }
}

// =============================================================================
// System
// =============================================================================

/// Result of `lssystem`
#[derive(Debug, Clone, PartialEq)]
pub struct SystemRecord {
    pub name: String,
    pub vendor: String,
    pub model: String,
    /// First whitespace-delimited token of `code_level`, e.g. `8.4.0.2`
    pub version: String,
    pub physical_capacity: Option<f64>,
    pub physical_free: Option<f64>,
}

impl SystemRecord {
    pub fn from_raw(raw: &RawRecord) -> Result<Self> {
        let f = Fields::new("system", raw);
        let code_level = f.required("code_level")?;
        let product = f.text("product_name").unwrap_or_default();
        let (vendor, model) = split_product(&product);
        let name = f.text("name").unwrap_or_default();

        Ok(Self {
            version: code_level.split_whitespace().next().unwrap_or_default().to_string(),
            vendor,
            model,
            physical_capacity: f.capacity(&name, "physical_capacity"),
            physical_free: f.capacity(&name, "physical_free_capacity"),
            name,
        })
    }
}

/// `"IBM FlashSystem 9200"` becomes `("IBM", "FlashSystem 9200")`
fn split_product(product: &str) -> (String, String) {
    let trimmed = product.trim();
    match trimmed.split_once(char::is_whitespace) {
        Some((vendor, model)) => (vendor.to_string(), model.trim().to_string()),
        None => (trimmed.to_string(), String::new()),
    }
}

// =============================================================================
// Nodes, Stats, Users
// =============================================================================

/// One entry of `lsnode`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub io_group: String,
}

impl NodeRecord {
    pub fn from_raw(raw: &RawRecord) -> Self {
        let f = Fields::new("node", raw);
        Self {
            id: f.text("id").unwrap_or_default(),
            name: f.text("name").unwrap_or_default(),
            status: f.text("status").unwrap_or_default(),
            io_group: f.text("IO_group_name").unwrap_or_default(),
        }
    }
}

/// One entry of `lssystemstats`
#[derive(Debug, Clone, PartialEq)]
pub struct StatRecord {
    pub name: String,
    /// `None` when `stat_current` is missing or unparsable
    pub current: Option<f64>,
}

impl StatRecord {
    pub fn from_raw(raw: &RawRecord) -> Result<Self> {
        let f = Fields::new("stat", raw);
        let name = f.required("stat_name")?;
        let current = match f.text("stat_current") {
            Some(v) => match v.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Some(n),
                _ => {
                    warn!(stat = %name, value = %v, "Unparsable stat value");
                    None
                }
            },
            None => None,
        };
        Ok(Self { name, current })
    }
}

/// One entry of `lscurrentuser`; entries without a role are kept as `None`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub role: Option<String>,
}

impl UserRecord {
    pub fn from_raw(raw: &RawRecord) -> Self {
        Self {
            role: Fields::new("user", raw).text("role"),
        }
    }
}

// =============================================================================
// Volumes
// =============================================================================

/// One entry of `lsvdisk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeListEntry {
    pub id: String,
    pub pool_name: String,
}

impl VolumeListEntry {
    pub fn from_raw(raw: &RawRecord) -> Result<Self> {
        let f = Fields::new("volume", raw);
        Ok(Self {
            id: f.required("id")?,
            pool_name: f.required("mdisk_grp_name")?,
        })
    }
}

/// Result of `lsvdisk/<id>`: the volume entry followed by its primary copy
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeRecord {
    pub id: String,
    pub name: String,
    pub pool_name: String,
    pub pool_id: String,
    pub thin: bool,
    pub compressed: bool,
    pub deduplicated: bool,
    pub encrypted: bool,
    pub capacity: Option<f64>,
    pub used_before_reduction: Option<f64>,
    pub uncompressed_used: Option<f64>,
}

impl VolumeRecord {
    pub fn from_detail(id: &str, entries: &[RawRecord]) -> Result<Self> {
        let (base, copy) = match entries {
            [base, copy, ..] => (Fields::new("volume", base), Fields::new("volume copy", copy)),
            _ => {
                return Err(Error::MalformedResponse {
                    command: format!("lsvdisk/{}", id),
                    reason: format!("expected volume and copy entries, got {}", entries.len()),
                })
            }
        };

        if !copy.flag("primary") {
            return Err(Error::MalformedResponse {
                command: format!("lsvdisk/{}", id),
                reason: "volume has no primary copy".into(),
            });
        }

        let name = base
            .text("volume_name")
            .or_else(|| base.text("name"))
            .unwrap_or_else(|| id.to_string());

        Ok(Self {
            id: id.to_string(),
            pool_name: copy.required("mdisk_grp_name")?,
            pool_id: copy.required("mdisk_grp_id")?,
            thin: copy.flag("se_copy"),
            compressed: copy.flag("compressed_copy"),
            deduplicated: copy.flag("deduplicated_copy"),
            encrypted: copy.flag("encrypt"),
            capacity: base.capacity(id, "capacity"),
            used_before_reduction: base.capacity(id, "used_capacity_before_reduction"),
            uncompressed_used: base.capacity(id, "uncompressed_used_capacity"),
            name,
        })
    }
}
