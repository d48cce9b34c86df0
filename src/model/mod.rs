//! Array Record Model
//!
//! Typed views of the array's JSON listings, built once at ingestion.

pub mod capacity;
pub mod records;

pub use capacity::parse_capacity;
pub use records::{
    DiskRecord, NodeRecord, PoolRecord, PoolStatus, RawRecord, StatRecord, SystemRecord,
    UserRecord, VolumeListEntry, VolumeRecord,
};
