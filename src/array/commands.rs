//! Typed array commands
//!
//! Thin wrappers over [`ArraySession::execute`] that turn each listing into
//! model records. Entries that cannot be typed are logged and left out.

use super::session::ArraySession;
use crate::error::Result;
use crate::model::{
    DiskRecord, NodeRecord, PoolRecord, RawRecord, StatRecord, SystemRecord, UserRecord,
    VolumeListEntry, VolumeRecord,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

impl ArraySession {
    /// `lssystem`
    pub async fn system(&mut self) -> Result<SystemRecord> {
        let raw: RawRecord = self.execute("lssystem").await?;
        SystemRecord::from_raw(&raw)
    }

    /// `lssystemstats`
    pub async fn system_stats(&mut self) -> Result<Vec<StatRecord>> {
        let raw: Vec<RawRecord> = self.execute("lssystemstats").await?;
        Ok(raw
            .iter()
            .filter_map(|entry| match StatRecord::from_raw(entry) {
                Ok(stat) => Some(stat),
                Err(e) => {
                    warn!(array = %self.array(), "Skipping stat entry: {}", e);
                    None
                }
            })
            .collect())
    }

    /// `lsnode`
    pub async fn nodes(&mut self) -> Result<Vec<NodeRecord>> {
        let raw: Vec<RawRecord> = self.execute("lsnode").await?;
        Ok(raw.iter().map(NodeRecord::from_raw).collect())
    }

    /// `lsmdiskgrp`
    pub async fn pools(&mut self) -> Result<Vec<PoolRecord>> {
        let raw: Vec<RawRecord> = self.execute("lsmdiskgrp").await?;
        Ok(raw
            .iter()
            .filter_map(|entry| match PoolRecord::from_raw(entry) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn!(array = %self.array(), "Skipping pool entry: {}", e);
                    None
                }
            })
            .collect())
    }

    /// `lsmdisk` followed by `lsmdisk/<id>` for every disk in one of `pools`
    ///
    /// A disk whose detail cannot be fetched keeps its list entry fields.
    pub async fn disks(&mut self, pools: &BTreeSet<&str>) -> Result<Vec<DiskRecord>> {
        let list: Vec<RawRecord> = self.execute("lsmdisk").await?;
        let mut disks = Vec::new();

        for entry in &list {
            let Some(id) = entry.get("id").and_then(|v| v.as_str()) else {
                warn!(array = %self.array(), "Skipping disk entry without id");
                continue;
            };
            let pool = entry.get("mdisk_grp_name").and_then(|v| v.as_str()).unwrap_or_default();
            if !pools.contains(pool) {
                continue;
            }

            let detail: Option<RawRecord> = match self.execute(&format!("lsmdisk/{}", id)).await {
                Ok(detail) => Some(detail),
                Err(e) => {
                    warn!(array = %self.array(), disk = id, "Disk detail unavailable, using list entry: {}", e);
                    None
                }
            };
            match DiskRecord::from_raw(entry, detail.as_ref()) {
                Ok(disk) => disks.push(disk),
                Err(e) => warn!(array = %self.array(), disk = id, "Skipping disk: {}", e),
            }
        }

        debug!(array = %self.array(), disks = disks.len(), "Fetched pool member disks");
        Ok(disks)
    }

    /// `lscurrentuser`
    pub async fn current_user(&mut self) -> Result<Vec<UserRecord>> {
        let raw: Vec<RawRecord> = self.execute("lscurrentuser").await?;
        Ok(raw.iter().map(UserRecord::from_raw).collect())
    }

    /// `lsvdisk`, restricted to volumes in one of `pools`
    pub async fn volumes(&mut self, pools: &BTreeSet<&str>) -> Result<Vec<VolumeListEntry>> {
        let raw: Vec<RawRecord> = self.execute("lsvdisk").await?;
        Ok(raw
            .iter()
            .filter_map(|entry| match VolumeListEntry::from_raw(entry) {
                Ok(volume) => Some(volume),
                Err(e) => {
                    warn!(array = %self.array(), "Skipping volume entry: {}", e);
                    None
                }
            })
            .filter(|volume| pools.contains(volume.pool_name.as_str()))
            .collect())
    }

    /// `lsvdisk/<id>`
    pub async fn volume(&mut self, id: &str) -> Result<VolumeRecord> {
        let raw: Vec<RawRecord> = self.execute(&format!("lsvdisk/{}", id)).await?;
        VolumeRecord::from_detail(id, &raw)
    }
}
