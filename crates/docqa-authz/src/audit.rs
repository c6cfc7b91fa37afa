//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::gate::AccessDenied;

/// Event name recorded for denied authorization checks.
pub const ACCESS_DENIED_EVENT: &str = "authz.denied";

/// `previous_hash` of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// Actor that triggered the event.
    pub actor: String,
    /// Event type (e.g. `authz.denied`, `role.assign`).
    pub event: String,
    /// Event-specific payload.
    pub metadata: serde_json::Value,
    /// Hex SHA-256 over this entry's fields and `previous_hash`.
    pub hash: String,
    /// Hash of the preceding entry; [`GENESIS_HASH`] for the first one.
    pub previous_hash: String,
}

impl AuditEntry {
    fn compute_hash(
        timestamp: DateTime<Utc>,
        actor: &str,
        event: &str,
        metadata: &serde_json::Value,
        previous_hash: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(
            timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(actor.as_bytes());
        hasher.update(event.as_bytes());
        hasher.update(metadata.to_string().as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Tamper-evident audit log backed by a newline-delimited JSON file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    last_hash: String,
}

impl AuditLog {
    /// Open (or create) the audit log at `path`, loading the head hash from existing entries.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("unable to create audit directory {}", parent.display())
            })?;
        }
        let mut log = Self {
            path: path.clone(),
            last_hash: GENESIS_HASH.to_owned(),
        };
        if path.exists() {
            for line in BufReader::new(fs::File::open(&path)?).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: AuditEntry = serde_json::from_str(&line)
                    .with_context(|| format!("corrupt audit entry in {}", path.display()))?;
                log.last_hash = entry.hash;
            }
        }
        Ok(log)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a new audit entry.
    pub fn append(
        &mut self,
        actor: &str,
        event: &str,
        metadata: serde_json::Value,
    ) -> Result<AuditEntry> {
        let timestamp = Utc::now();
        let hash = AuditEntry::compute_hash(timestamp, actor, event, &metadata, &self.last_hash);
        let entry = AuditEntry {
            timestamp,
            actor: actor.to_string(),
            event: event.to_string(),
            metadata,
            hash: hash.clone(),
            previous_hash: self.last_hash.clone(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("unable to open audit log {}", self.path.display()))?;
        file.write_all(serde_json::to_string(&entry)?.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        self.last_hash = hash;
        Ok(entry)
    }

    /// Record a denied authorization check.
    pub fn record_denial(&mut self, denied: &AccessDenied) -> Result<AuditEntry> {
        self.append(
            &denied.actor_id,
            ACCESS_DENIED_EVENT,
            serde_json::json!({
                "action": denied.action,
                "resource": denied.resource.to_string(),
            }),
        )
    }

    /// Read back every entry in order.
    pub fn entries(&self) -> Result<Vec<AuditEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for line in BufReader::new(fs::File::open(&self.path)?).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }

    /// Verify integrity of the hash chain (detect tampering).
    pub fn verify(&self) -> Result<bool> {
        let mut previous = GENESIS_HASH.to_owned();
        for entry in self.entries()? {
            let expected = AuditEntry::compute_hash(
                entry.timestamp,
                &entry.actor,
                &entry.event,
                &entry.metadata,
                &previous,
            );
            if expected != entry.hash || entry.previous_hash != previous {
                return Ok(false);
            }
            previous = entry.hash;
        }
        Ok(true)
    }
}
