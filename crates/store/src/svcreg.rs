// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The service registry: a heartbeat-based
//! directory of scheduler/coordinator/worker instances for discovery
//! and HA, one file per `(service_name, instance_id)` under
//! `DATA_DIR/service-registry/<service_name>/<instance_id>.json`.
//!
//! Unlike the process registry, membership here is never
//! exclusive — many coordinators/workers of the same service legitimately
//! coexist — so registration is a plain create-or-overwrite, and liveness
//! is purely a function of mtime age and JSON parseability.

use crate::error::StoreError;
use dagctl_core::ServiceInstanceId;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMember {
    pub service_name: String,
    pub instance_id: ServiceInstanceId,
    pub host: String,
    pub port: u16,
    pub started_at_ms: u64,
}

/// A member's derived status, independent of the raw
/// record: `Active` if its heartbeat is fresh, `Inactive` if stale,
/// `Unknown` if the file could not be parsed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberStatus {
    Active,
    Inactive,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberView {
    pub member: Option<ServiceMember>,
    pub status: MemberStatus,
    pub heartbeat_age: Option<Duration>,
}

fn member_dir(data_dir: &Path, service_name: &str) -> PathBuf {
    data_dir.join("service-registry").join(service_name)
}

fn member_path(data_dir: &Path, service_name: &str, instance_id: &ServiceInstanceId) -> PathBuf {
    member_dir(data_dir, service_name).join(format!("{instance_id}.json"))
}

/// Register (or re-register) a member. Idempotent: calling this again
/// for the same instance just overwrites the record and bumps mtime.
pub fn register(data_dir: &Path, member: &ServiceMember) -> Result<(), StoreError> {
    let path = member_path(data_dir, &member.service_name, &member.instance_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let body = serde_json::to_vec(member).map_err(|e| StoreError::Corrupt { path: path.clone(), line: 0, source: e })?;
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path).map_err(|e| StoreError::io(&path, e))?;
    file.write_all(&body).map_err(|e| StoreError::io(&path, e))?;
    file.sync_all().map_err(|e| StoreError::io(&path, e))?;
    Ok(())
}

/// Bump a member's mtime to prove liveness without rewriting its body.
pub fn heartbeat(data_dir: &Path, service_name: &str, instance_id: &ServiceInstanceId) -> Result<(), StoreError> {
    let path = member_path(data_dir, service_name, instance_id);
    let now = filetime::FileTime::now();
    filetime::set_file_mtime(&path, now).map_err(|e| StoreError::io(&path, e))
}

/// Remove a member's record on graceful shutdown.
pub fn deregister(data_dir: &Path, service_name: &str, instance_id: &ServiceInstanceId) -> Result<(), StoreError> {
    let path = member_path(data_dir, service_name, instance_id);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io(&path, e)),
    }
}

fn classify(path: &Path, ttl: Duration) -> Result<MemberView, StoreError> {
    let meta = fs::metadata(path).map_err(|e| StoreError::io(path, e))?;
    let age = meta.modified().ok().and_then(|m| m.elapsed().ok());
    let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
    let member: Option<ServiceMember> = serde_json::from_slice(&bytes).ok();

    let status = match (&member, age) {
        (None, _) => MemberStatus::Unknown,
        (Some(_), Some(age)) if age <= ttl => MemberStatus::Active,
        (Some(_), Some(_)) => MemberStatus::Inactive,
        // No readable mtime at all is treated as fresh rather than guessed stale.
        (Some(_), None) => MemberStatus::Active,
    };
    Ok(MemberView { member, status, heartbeat_age: age })
}

/// Every member registered for `service_name`, classified by freshness.
pub fn list_members(data_dir: &Path, service_name: &str, ttl: Duration) -> Result<Vec<MemberView>, StoreError> {
    let dir = member_dir(data_dir, service_name);
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
        out.push(classify(&entry.path(), ttl)?);
    }
    Ok(out)
}

/// Members currently `Active` for `service_name` — the view used for
/// worker/coordinator discovery.
pub fn list_active(data_dir: &Path, service_name: &str, ttl: Duration) -> Result<Vec<ServiceMember>, StoreError> {
    Ok(list_members(data_dir, service_name, ttl)?
        .into_iter()
        .filter(|v| v.status == MemberStatus::Active)
        .filter_map(|v| v.member)
        .collect())
}

/// Delete members whose record is stale beyond `gc_after` (much longer
/// than `ttl`, so a briefly-missed heartbeat doesn't cause churn) — run
/// periodically by the scheduler alongside zombie reaping.
pub fn gc_expired(data_dir: &Path, service_name: &str, gc_after: Duration) -> Result<usize, StoreError> {
    let dir = member_dir(data_dir, service_name);
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(StoreError::io(&dir, e)),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
        let path = entry.path();
        let meta = fs::metadata(&path).map_err(|e| StoreError::io(&path, e))?;
        let stale = meta.modified().ok().and_then(|m| m.elapsed().ok()).map(|age| age > gc_after).unwrap_or(false);
        if stale {
            fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}
