//! Coarse audit trail of who did what to which document
//!
//! The service writes here after a change has committed. Writes are best
//! effort: a failing sink is logged and never undoes the change it describes.
use crate::types::TimeStamp;
use chrono::Utc;
use std::fmt;
use uuid7::uuid7;

pub const AUDIT_TREE: &str = "audit_log";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    #[n(0)]
    Create,
    #[n(1)]
    Update,
    #[n(2)]
    Delete,
    #[n(3)]
    Approve,
    #[n(4)]
    Rollback,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    #[n(0)]
    pub user: Option<String>, // None for unauthenticated actors
    #[n(1)]
    pub action: AuditAction,
    #[n(2)]
    pub entity_type: String,
    #[n(3)]
    pub entity_id: String,
    #[n(4)]
    pub detail: String,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> anyhow::Result<()>;
}

/// Audit entries kept in their own sled tree, keyed by uuid7 so keys sort by time.
#[derive(Clone)]
pub struct SledAuditLog {
    tree: sled::Tree,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Approve => "approve",
            AuditAction::Rollback => "rollback",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuditEntry {
    pub fn new(
        user: Option<String>,
        action: AuditAction,
        entity_type: &str,
        entity_id: &str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            user,
            action,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            detail: detail.into(),
            created_at: TimeStamp::new(),
        }
    }
}

impl SledAuditLog {
    pub fn open(db: &sled::Db) -> sled::Result<Self> {
        Ok(Self {
            tree: db.open_tree(AUDIT_TREE)?,
        })
    }

    /// Newest first.
    pub fn entries(&self) -> anyhow::Result<Vec<AuditEntry>> {
        self.tree
            .iter()
            .rev()
            .map(|item| -> anyhow::Result<AuditEntry> {
                let (_, value) = item?;
                Ok(minicbor::decode(&value)?)
            })
            .collect()
    }
}

impl AuditSink for SledAuditLog {
    fn record(&self, entry: AuditEntry) -> anyhow::Result<()> {
        let cbor = minicbor::to_vec(&entry)?;
        self.tree.insert(uuid7().as_bytes(), cbor)?;
        Ok(())
    }
}
