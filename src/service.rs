//! Service layer API for document workflow operations
//!
//! Every operation authorizes the actor first. Mutations of an existing
//! document run inside one sled transaction, so history snapshots, field
//! changes and approval transitions commit together or not at all. Audit
//! entries are written after the commit and never fail the operation.
use crate::access::{Action, Actor, authorize};
use crate::audit::{AuditAction, AuditEntry, AuditSink, SledAuditLog};
use crate::config::{Config, HistoryRetention};
use crate::contract::{Contract, ContractDraft};
use crate::document::{LineItemDraft, Versioned};
use crate::error::{WorkflowError, abort};
use crate::estimate::{Estimate, EstimateDraft};
use crate::gate::{self, ValidationMode};
use crate::history::{self, HistoryRecord, HistoryView};
use crate::store::{Store, load_tx, save_tx};
use crate::types::{CalendarDate, TimeStamp};
use crate::utils;
use anyhow::Context;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, TransactionError, TransactionalTree};
use std::sync::Arc;

const HISTORY_PREFIX: &str = "history_";
const ITEM_PREFIX: &str = "item_";

pub struct LedgerService {
    store: Store,
    audit: Arc<dyn AuditSink>,
    config: Config,
}

impl LedgerService {
    pub fn new(
        instance: Arc<sled::Db>,
        audit: Arc<dyn AuditSink>,
        config: Config,
    ) -> Result<Self, WorkflowError> {
        Ok(Self {
            store: Store::new(instance)?,
            audit,
            config,
        })
    }

    /// Open the database named in `config`, auditing into the same database.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let db = sled::open(&config.db_path)
            .with_context(|| format!("failed to open {}", config.db_path.display()))?;
        let audit = SledAuditLog::open(&db)?;
        tracing::info!(path = %config.db_path.display(), retention = ?config.history_retention, "ledger opened");

        Ok(Self::new(Arc::new(db), Arc::new(audit), config)?)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn create_estimate(
        &self,
        draft: EstimateDraft,
        actor: &Actor,
    ) -> Result<Estimate, WorkflowError> {
        authorize(actor, Action::Create, Estimate::RESOURCE)?;
        let estimate = draft.validate_and_finalise(new_id(Estimate::ID_PREFIX)?, TimeStamp::new())?;
        self.insert_new(estimate, actor)
    }

    /// Fails with a validation error unless the referenced estimate is approved.
    pub fn create_contract(
        &self,
        draft: ContractDraft,
        actor: &Actor,
    ) -> Result<Contract, WorkflowError> {
        authorize(actor, Action::Create, Contract::RESOURCE)?;
        let contract = draft.validate_and_finalise(new_id(Contract::ID_PREFIX)?, TimeStamp::new())?;
        self.insert_new(contract, actor)
    }

    pub fn get<T: Versioned>(&self, id: &str, actor: &Actor) -> Result<T, WorkflowError> {
        authorize(actor, Action::Read, T::RESOURCE)?;
        self.store.load::<T>(id)?.ok_or_else(|| not_found::<T>(id))
    }

    pub fn list<T: Versioned>(&self, actor: &Actor) -> Result<Vec<T>, WorkflowError> {
        authorize(actor, Action::Read, T::RESOURCE)?;
        self.store.list::<T>()
    }

    /// Apply the provided draft fields, snapshotting the previous state first.
    pub fn update<T: Versioned>(
        &self,
        id: &str,
        draft: &T::Draft,
        actor: &Actor,
    ) -> Result<T, WorkflowError> {
        authorize(actor, Action::Update, T::RESOURCE)?;
        let record_id = new_id(HISTORY_PREFIX)?;
        let family = self.store.family::<T>();

        let result: Result<(T, HistoryRecord), TransactionError<WorkflowError>> = (
            &family.documents,
            &family.history,
            self.store.sequences(),
        )
            .transaction(|(documents, history, sequences)| {
                let mut document = load_or_abort::<T>(documents, id)?;
                let record = history::record_before_mutation(
                    history,
                    sequences,
                    &document,
                    &record_id,
                    actor.reference(),
                )?;

                if let Err(err) = document.apply_draft(draft) {
                    return abort(err);
                }
                document.touch(TimeStamp::new());
                save_tx(documents, &document)?;
                Ok((document, record))
            });
        let (document, record) = result?;
        self.after_commit()?;

        tracing::info!(entity_type = T::ENTITY_TYPE, id, version = record.version, "document updated");
        self.audit(actor, AuditAction::Update, T::ENTITY_TYPE, id, String::new());
        Ok(document)
    }

    /// Snapshot then remove the document. History is kept or purged per config.
    pub fn delete<T: Versioned>(&self, id: &str, actor: &Actor) -> Result<(), WorkflowError> {
        authorize(actor, Action::Delete, T::RESOURCE)?;
        let record_id = new_id(HISTORY_PREFIX)?;
        let family = self.store.family::<T>();
        let retention = self.config.history_retention;

        let result: Result<u32, TransactionError<WorkflowError>> = (
            &family.documents,
            &family.history,
            self.store.sequences(),
        )
            .transaction(|(documents, history, sequences)| {
                let document = load_or_abort::<T>(documents, id)?;
                let record = history::record_before_mutation(
                    history,
                    sequences,
                    &document,
                    &record_id,
                    actor.reference(),
                )?;
                documents.remove(id.as_bytes())?;

                if retention == HistoryRetention::Cascade {
                    history::purge_tx(history, sequences, id)?;
                }
                Ok(record.version)
            });
        let version = result?;
        self.after_commit()?;

        tracing::info!(entity_type = T::ENTITY_TYPE, id, version, ?retention, "document deleted");
        self.audit(actor, AuditAction::Delete, T::ENTITY_TYPE, id, String::new());
        Ok(())
    }

    /// Pending -> Approved. Approving twice fails with `AlreadyApproved`.
    pub fn approve<T: Versioned>(&self, id: &str, actor: &Actor) -> Result<T, WorkflowError> {
        authorize(actor, Action::Approve, T::RESOURCE)?;
        let family = self.store.family::<T>();

        let result: Result<T, TransactionError<WorkflowError>> =
            family.documents.transaction(|documents| {
                let mut document = load_or_abort::<T>(documents, id)?;
                if let Err(already) = document
                    .approval_mut()
                    .approve(&actor.id, CalendarDate::today())
                {
                    return abort(WorkflowError::AlreadyApproved {
                        entity_type: T::ENTITY_TYPE,
                        status: already.0,
                    });
                }
                document.touch(TimeStamp::new());
                save_tx(documents, &document)?;
                Ok(document)
            });
        let document = result?;
        self.after_commit()?;

        tracing::info!(entity_type = T::ENTITY_TYPE, id, approver = %actor.id, "document approved");
        self.audit(actor, AuditAction::Approve, T::ENTITY_TYPE, id, String::new());
        Ok(document)
    }

    /// Newest version first.
    pub fn list_history<T: Versioned>(
        &self,
        id: &str,
        actor: &Actor,
    ) -> Result<Vec<HistoryRecord>, WorkflowError> {
        authorize(actor, Action::ViewHistory, T::RESOURCE)?;
        let records = self.store.history::<T>(id)?;
        // retained history of a deleted document stays readable
        if records.is_empty() && self.store.load::<T>(id)?.is_none() {
            return Err(not_found::<T>(id));
        }
        tracing::debug!(entity_type = T::ENTITY_TYPE, id, count = records.len(), "history listed");
        Ok(records)
    }

    /// History with each record's change summary against the record before it.
    pub fn history_with_diffs<T: Versioned>(
        &self,
        id: &str,
        actor: &Actor,
    ) -> Result<Vec<HistoryView>, WorkflowError> {
        let records = self.list_history::<T>(id, actor)?;
        Ok(history::with_diffs(T::WATCH_LIST, records))
    }

    /// Restore the document to the snapshot held by `history_id`.
    ///
    /// The record must belong to this document and still match its digest.
    /// The contract estimate gate is skipped and no new history record is written.
    pub fn rollback<T: Versioned>(
        &self,
        id: &str,
        history_id: &str,
        actor: &Actor,
    ) -> Result<T, WorkflowError> {
        authorize(actor, Action::Rollback, T::RESOURCE)?;
        if self.store.load::<T>(id)?.is_none() {
            return Err(not_found::<T>(id));
        }
        // only this document's records are searched, so a foreign id reads as absent
        let target = self
            .store
            .history::<T>(id)?
            .into_iter()
            .find(|record| record.id == history_id)
            .ok_or_else(|| WorkflowError::NotFound {
                entity_type: "HistoryRecord",
                id: history_id.to_string(),
            })?;
        if !target.verify_digest() {
            return Err(WorkflowError::Codec(format!(
                "history record {history_id} does not match its digest"
            )));
        }

        let family = self.store.family::<T>();
        let result: Result<T, TransactionError<WorkflowError>> =
            family.documents.transaction(|documents| {
                let mut document = load_or_abort::<T>(documents, id)?;
                if let Err(err) = document.apply_snapshot(&target.snapshot) {
                    return abort(err);
                }
                if let Err(err) = self.check_gate(&document, ValidationMode::Bypass) {
                    return abort(err);
                }
                document.touch(TimeStamp::new());
                save_tx(documents, &document)?;
                Ok(document)
            });
        let document = result?;
        self.after_commit()?;

        tracing::info!(entity_type = T::ENTITY_TYPE, id, version = target.version, "document rolled back");
        self.audit(
            actor,
            AuditAction::Rollback,
            T::ENTITY_TYPE,
            id,
            format!("restored version {}", target.version),
        );
        Ok(document)
    }

    /// Line items are not part of the snapshot, so this writes no history.
    pub fn add_item<T: Versioned>(
        &self,
        id: &str,
        draft: &LineItemDraft,
        actor: &Actor,
    ) -> Result<T, WorkflowError> {
        authorize(actor, Action::Update, T::RESOURCE)?;
        let item = draft.validate_and_finalise(new_id(ITEM_PREFIX)?)?;
        let item_id = item.id.clone();

        let document = self.modify_items::<T>(id, |items| {
            items.push(item.clone());
            Ok(())
        })?;
        self.audit(
            actor,
            AuditAction::Update,
            T::ENTITY_TYPE,
            id,
            format!("line item {item_id} added"),
        );
        Ok(document)
    }

    pub fn remove_item<T: Versioned>(
        &self,
        id: &str,
        item_id: &str,
        actor: &Actor,
    ) -> Result<T, WorkflowError> {
        authorize(actor, Action::Update, T::RESOURCE)?;

        let document = self.modify_items::<T>(id, |items| {
            let before = items.len();
            items.retain(|item| item.id != item_id);
            if items.len() == before {
                return Err(WorkflowError::NotFound {
                    entity_type: "LineItem",
                    id: item_id.to_string(),
                });
            }
            Ok(())
        })?;
        self.audit(
            actor,
            AuditAction::Update,
            T::ENTITY_TYPE,
            id,
            format!("line item {item_id} removed"),
        );
        Ok(document)
    }

    fn modify_items<T: Versioned>(
        &self,
        id: &str,
        change: impl Fn(&mut Vec<crate::document::LineItem>) -> Result<(), WorkflowError>,
    ) -> Result<T, WorkflowError> {
        let family = self.store.family::<T>();
        let result: Result<T, TransactionError<WorkflowError>> =
            family.documents.transaction(|documents| {
                let mut document = load_or_abort::<T>(documents, id)?;
                if let Err(err) = change(document.items_mut()) {
                    return abort(err);
                }
                document.touch(TimeStamp::new());
                save_tx(documents, &document)?;
                Ok(document)
            });
        let document = result?;
        self.after_commit()?;
        tracing::debug!(entity_type = T::ENTITY_TYPE, id, items = document.items().len(), "line items changed");
        Ok(document)
    }

    fn insert_new<T: Versioned>(&self, document: T, actor: &Actor) -> Result<T, WorkflowError> {
        // nothing is written when the gate refuses
        self.check_gate(&document, ValidationMode::Enforce)?;

        let cbor = minicbor::to_vec(&document)?;
        self.store
            .family::<T>()
            .documents
            .insert(document.id().as_bytes(), cbor)?;
        self.after_commit()?;

        tracing::info!(entity_type = T::ENTITY_TYPE, id = document.id(), "document created");
        self.audit(actor, AuditAction::Create, T::ENTITY_TYPE, document.id(), String::new());
        Ok(document)
    }

    /// Apply the estimate gate to documents that carry one.
    fn check_gate<T: Versioned>(&self, document: &T, mode: ValidationMode) -> Result<(), WorkflowError> {
        if !T::ESTIMATE_GATED {
            return Ok(());
        }
        let approval = match (mode, document.linked_estimate()) {
            (ValidationMode::Enforce, Some(estimate_id)) => self
                .store
                .load::<Estimate>(estimate_id)?
                .map(|estimate| estimate.approval),
            _ => None,
        };
        gate::admit_contract(approval.as_ref(), mode)?;
        Ok(())
    }

    fn after_commit(&self) -> Result<(), WorkflowError> {
        if self.config.flush_on_write {
            self.store.flush()?;
        }
        Ok(())
    }

    fn audit(&self, actor: &Actor, action: AuditAction, entity_type: &str, id: &str, detail: String) {
        let entry = AuditEntry::new(actor.reference(), action, entity_type, id, detail);
        if let Err(err) = self.audit.record(entry) {
            tracing::warn!(%action, entity_type, id, error = %err, "audit entry dropped");
        }
    }
}

fn load_or_abort<T: Versioned>(
    documents: &TransactionalTree,
    id: &str,
) -> ConflictableTransactionResult<T, WorkflowError> {
    match load_tx::<T>(documents, id.as_bytes())? {
        Some(document) => Ok(document),
        None => abort(not_found::<T>(id)),
    }
}

fn not_found<T: Versioned>(id: &str) -> WorkflowError {
    WorkflowError::NotFound {
        entity_type: T::ENTITY_TYPE,
        id: id.to_string(),
    }
}

fn new_id(prefix: &str) -> Result<String, WorkflowError> {
    utils::new_uuid_to_bech32(prefix).map_err(|err| WorkflowError::Identifier(err.to_string()))
}
