pub mod access;
pub mod approval;
pub mod audit;
pub mod config;
pub mod contract;
pub mod diff;
pub mod document;
pub mod error;
pub mod estimate;
mod gate;
pub mod history;
pub mod service;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod utils;

pub use access::{Action, Actor, Resource, Role};
pub use approval::{Approval, ApprovalStatus};
pub use audit::{AuditAction, AuditEntry, AuditSink, SledAuditLog};
pub use config::{Config, HistoryRetention};
pub use contract::{Contract, ContractDraft, ContractType, CustomerConfirmation};
pub use document::{LineItem, LineItemDraft, Versioned};
pub use error::{ValidationError, WorkflowError};
pub use estimate::{Estimate, EstimateDraft};
pub use history::{HistoryRecord, HistoryView};
pub use service::LedgerService;
