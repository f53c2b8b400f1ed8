use anyhow::{Context, anyhow};
use sled::open;
use std::sync::Arc;
use document_ledger::{
    Actor, ApprovalStatus, AuditAction, AuditEntry, AuditSink, Config, Contract, ContractDraft,
    ContractType, Estimate, EstimateDraft, HistoryRetention, LedgerService, LineItemDraft,
    HistoryRecord, Role, SledAuditLog, ValidationError, Versioned, WorkflowError, diff,
    snapshot::FieldValue, types::CalendarDate, utils,
};

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

// Sled locks its database file, so every test gets its own database under a
// temp dir. The TempDir is handed back so it outlives the service.
fn ledger(name: &str, retention: HistoryRetention) -> anyhow::Result<(TempDir, LedgerService, SledAuditLog)> {
    let temp_dir = tempdir()?;
    let db_path = temp_dir.path().join(name);
    let db = open(&db_path)?;
    db.clear()?;

    let audit = SledAuditLog::open(&db)?;
    let config = Config::default()
        .with_db_path(db_path)
        .with_history_retention(retention);
    let service = LedgerService::new(Arc::new(db), Arc::new(audit.clone()), config)?;
    Ok((temp_dir, service, audit))
}

fn actor(role: Role) -> anyhow::Result<Actor> {
    Ok(Actor::new(utils::new_uuid_to_bech32("user_")?, role))
}

fn draft_estimate(amount: u64) -> EstimateDraft {
    EstimateDraft::new().set_case("case_1").set_total_amount(amount)
}

fn draft_contract(estimate_id: &str) -> ContractDraft {
    ContractDraft::new()
        .set_case("case_1")
        .set_estimate(estimate_id)
        .set_contract_type(ContractType::Contract)
        .set_contract_date(CalendarDate::from_ymd(2025, 4, 1).unwrap())
        .set_contract_amount(1_200_000)
}

#[test]
fn updates_build_a_versioned_history_with_diffs() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_history.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    let id = estimate.id.clone();

    service
        .update::<Estimate>(&id, &EstimateDraft::new().set_total_amount(1500), &sales)
        .context("first update failed")?;
    service
        .update::<Estimate>(&id, &EstimateDraft::new().set_total_amount(2000), &sales)
        .context("second update failed")?;

    let current: Estimate = service.get(&id, &sales)?;
    assert_eq!(current.total_amount, 2000);

    let history = service.history_with_diffs::<Estimate>(&id, &sales)?;
    assert_eq!(history.len(), 2);

    // newest first, each record holds the state before its update
    assert_eq!(history[0].record.version, 2);
    assert_eq!(history[1].record.version, 1);
    assert!(history[0].record.changed_at > history[1].record.changed_at);
    assert_eq!(history[0].diff_summary, "total_amount: 1000 → 1500");
    assert_eq!(history[1].diff_summary, diff::INITIAL_CREATION);

    for view in &history {
        assert!(view.record.verify_digest());
        assert_eq!(view.record.entity_id, id);
        assert_eq!(view.record.changed_by.as_deref(), Some(sales.id.as_str()));
    }
    Ok(())
}

#[test]
fn unwatched_change_reports_no_significant_change() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_no_change.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_case("case_2"), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_case("case_3"), &sales)?;

    let history = service.history_with_diffs::<Estimate>(&estimate.id, &sales)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].diff_summary, diff::NO_SIGNIFICANT_CHANGE);
    Ok(())
}

#[test]
fn approval_is_one_way_and_writes_no_history() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_approval.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    let approved: Estimate = service.approve(&estimate.id, &hq)?;

    assert_eq!(approved.approval.status, ApprovalStatus::Approved);
    assert_eq!(approved.approval.approver.as_deref(), Some(hq.id.as_str()));
    assert_eq!(approved.approval.approval_date, Some(CalendarDate::today()));

    let err = service.approve::<Estimate>(&estimate.id, &hq).unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::AlreadyApproved {
            status: ApprovalStatus::Approved,
            ..
        }
    ));

    assert!(service.list_history::<Estimate>(&estimate.id, &hq)?.is_empty());
    Ok(())
}

#[test]
fn contract_requires_an_approved_estimate() -> anyhow::Result<()> {
    let (_dir, service, audit) = ledger("test_gate.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1_200_000), &sales)?;

    let err = service
        .create_contract(draft_contract(&estimate.id), &sales)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::EstimateNotApproved)
    ));

    let err = service
        .create_contract(draft_contract(&estimate.id).clear_estimate(), &sales)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::MissingEstimate)
    ));

    // refused creations leave neither a contract nor an audit entry behind
    assert!(service.list::<Contract>(&sales)?.is_empty());
    assert!(
        audit
            .entries()?
            .iter()
            .all(|entry| entry.entity_type != "Contract")
    );

    service.approve::<Estimate>(&estimate.id, &hq)?;
    let contract = service.create_contract(draft_contract(&estimate.id), &sales)?;

    assert_eq!(contract.estimate_id.as_deref(), Some(estimate.id.as_str()));
    assert_eq!(contract.approval.status, ApprovalStatus::Pending);
    assert_eq!(service.list::<Contract>(&sales)?.len(), 1);
    Ok(())
}

#[test]
fn rollback_restores_a_prior_version() -> anyhow::Result<()> {
    let (_dir, service, audit) = ledger("test_rollback.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(2000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(3000), &sales)?;

    let history = service.list_history::<Estimate>(&estimate.id, &hq)?;
    let first = history
        .iter()
        .find(|record| record.version == 1)
        .ok_or_else(|| anyhow!("version 1 missing"))?;

    let restored: Estimate = service.rollback(&estimate.id, &first.id, &hq)?;
    assert_eq!(restored.total_amount, 1000);
    assert_eq!(restored.case_id, estimate.case_id);
    assert_eq!(restored.created_at, estimate.created_at);

    // rollback writes no history of its own
    assert_eq!(service.list_history::<Estimate>(&estimate.id, &hq)?.len(), 2);

    let latest = &audit.entries()?[0];
    assert_eq!(latest.action, AuditAction::Rollback);
    assert_eq!(latest.entity_id, estimate.id);
    assert_eq!(latest.detail, "restored version 1");
    Ok(())
}

#[test]
fn contract_rollback_skips_the_estimate_gate() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_rollback_gate.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.approve::<Estimate>(&estimate.id, &hq)?;
    let contract = service.create_contract(draft_contract(&estimate.id), &sales)?;

    service.update::<Contract>(
        &contract.id,
        &ContractDraft::new().set_contract_amount(900_000),
        &sales,
    )?;
    // the estimate no longer exists, so creation would now be refused
    service.delete::<Estimate>(&estimate.id, &sales)?;

    let history = service.list_history::<Contract>(&contract.id, &hq)?;
    let restored: Contract = service.rollback(&contract.id, &history[0].id, &hq)?;
    assert_eq!(restored.contract_amount, 1_200_000);
    Ok(())
}

#[test]
fn contract_rollback_keeps_a_link_to_an_unapproved_estimate() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_rollback_unapproved.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    // an edit before approval leaves a Pending snapshot to return to
    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(1100), &sales)?;
    service.approve::<Estimate>(&estimate.id, &hq)?;

    let contract = service.create_contract(draft_contract(&estimate.id), &sales)?;
    service.update::<Contract>(
        &contract.id,
        &ContractDraft::new().set_contract_amount(800_000),
        &sales,
    )?;

    let pending = service.list_history::<Estimate>(&estimate.id, &hq)?;
    let unapproved: Estimate = service.rollback(&estimate.id, &pending[0].id, &hq)?;
    assert_eq!(unapproved.approval.status, ApprovalStatus::Pending);
    assert!(unapproved.approval.approver.is_none());

    let history = service.list_history::<Contract>(&contract.id, &hq)?;
    let restored: Contract = service
        .rollback(&contract.id, &history[0].id, &hq)
        .context("rollback must not consult the estimate gate")?;

    assert_eq!(restored.contract_amount, 1_200_000);
    assert_eq!(restored.estimate_id.as_deref(), Some(estimate.id.as_str()));
    let linked: Estimate = service.get(&estimate.id, &hq)?;
    assert!(!linked.approval.is_approved());
    Ok(())
}

#[test]
fn status_edits_cannot_approve_or_unapprove() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_status_edits.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let err = service
        .create_estimate(draft_estimate(1).set_approval_status(ApprovalStatus::Approved), &sales)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::ApprovalBypassed)
    ));

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    let err = service
        .update::<Estimate>(
            &estimate.id,
            &EstimateDraft::new()
                .set_total_amount(5)
                .set_approval_status(ApprovalStatus::Approved),
            &sales,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::ApprovalBypassed)
    ));

    // the refused update wrote nothing, so the gate still holds
    let current: Estimate = service.get(&estimate.id, &sales)?;
    assert_eq!(current.approval.status, ApprovalStatus::Pending);
    assert_eq!(current.total_amount, 1000);
    assert!(service.list_history::<Estimate>(&estimate.id, &sales)?.is_empty());
    assert!(
        service
            .create_contract(draft_contract(&estimate.id), &sales)
            .is_err()
    );

    // Pending and Rejected stay editable
    let rejected: Estimate = service.update(
        &estimate.id,
        &EstimateDraft::new().set_approval_status(ApprovalStatus::Rejected),
        &sales,
    )?;
    assert_eq!(rejected.approval.status, ApprovalStatus::Rejected);

    service.approve::<Estimate>(&estimate.id, &hq)?;
    let err = service
        .update::<Estimate>(
            &estimate.id,
            &EstimateDraft::new().set_approval_status(ApprovalStatus::Pending),
            &sales,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::ApprovalIsFinal(ApprovalStatus::Pending))
    ));

    let current: Estimate = service.get(&estimate.id, &sales)?;
    assert!(current.approval.is_approved());
    assert_eq!(current.approval.approver.as_deref(), Some(hq.id.as_str()));
    Ok(())
}

#[test]
fn rollback_refuses_a_record_that_fails_its_digest() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_tampered_history.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(2000), &sales)?;

    // rewrite the stored snapshot without updating its digest
    let history_tree = service.store().instance().open_tree(Estimate::HISTORY_TREE)?;
    let (key, value) = history_tree
        .iter()
        .next()
        .ok_or_else(|| anyhow!("no history stored"))??;
    let mut record: HistoryRecord = minicbor::decode(&value)?;
    record.snapshot = record.snapshot.with("total_amount", FieldValue::Amount(1));
    history_tree.insert(key, minicbor::to_vec(&record)?)?;

    let err = service
        .rollback::<Estimate>(&estimate.id, &record.id, &hq)
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Codec(_)));
    assert!(!err.is_client_error());

    let current: Estimate = service.get(&estimate.id, &hq)?;
    assert_eq!(current.total_amount, 2000);
    Ok(())
}

#[test]
fn rollback_rejects_history_of_another_document() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_foreign_history.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let first = service.create_estimate(draft_estimate(1000), &sales)?;
    let second = service.create_estimate(draft_estimate(5000), &sales)?;
    service.update::<Estimate>(&first.id, &EstimateDraft::new().set_total_amount(1), &sales)?;

    let foreign = service.list_history::<Estimate>(&first.id, &hq)?;
    let err = service
        .rollback::<Estimate>(&second.id, &foreign[0].id, &hq)
        .unwrap_err();

    assert!(matches!(
        err,
        WorkflowError::NotFound {
            entity_type: "HistoryRecord",
            ..
        }
    ));
    let untouched: Estimate = service.get(&second.id, &hq)?;
    assert_eq!(untouched.total_amount, 5000);
    Ok(())
}

#[test]
fn roles_are_enforced_before_anything_runs() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_roles.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let construction = actor(Role::Construction)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(10), &sales)?;
    let history = service.list_history::<Estimate>(&estimate.id, &sales)?;

    // construction reads but never writes
    let _: Estimate = service.get(&estimate.id, &construction)?;
    let forbidden = |err: WorkflowError| matches!(err, WorkflowError::Forbidden { .. });

    assert!(forbidden(
        service
            .update::<Estimate>(&estimate.id, &EstimateDraft::new(), &construction)
            .unwrap_err()
    ));
    assert!(forbidden(
        service
            .list_history::<Estimate>(&estimate.id, &construction)
            .unwrap_err()
    ));
    assert!(forbidden(
        service
            .create_estimate(draft_estimate(1), &construction)
            .unwrap_err()
    ));

    // sales cannot approve or roll back
    assert!(forbidden(service.approve::<Estimate>(&estimate.id, &sales).unwrap_err()));
    assert!(forbidden(
        service
            .rollback::<Estimate>(&estimate.id, &history[0].id, &sales)
            .unwrap_err()
    ));

    // a signed out actor is denied even reads
    let signed_out = hq.clone().signed_out();
    let err = service.get::<Estimate>(&estimate.id, &signed_out).unwrap_err();
    assert!(matches!(err, WorkflowError::Forbidden { role: None, .. }));

    // nothing above changed the estimate
    let current: Estimate = service.get(&estimate.id, &hq)?;
    assert_eq!(current.total_amount, 10);
    assert_eq!(current.approval.status, ApprovalStatus::Pending);
    Ok(())
}

#[test]
fn retained_history_outlives_a_deleted_document() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_retain.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(2000), &sales)?;
    service.delete::<Estimate>(&estimate.id, &sales)?;

    assert!(matches!(
        service.get::<Estimate>(&estimate.id, &sales).unwrap_err(),
        WorkflowError::NotFound { .. }
    ));

    // the delete itself snapshotted the last state
    let history = service.list_history::<Estimate>(&estimate.id, &sales)?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].version, 2);
    assert_eq!(
        history[0].snapshot.get("total_amount").to_string(),
        "2000"
    );
    Ok(())
}

#[test]
fn cascade_removes_history_with_the_document() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_cascade.db", HistoryRetention::Cascade)?;
    let sales = actor(Role::Sales)?;

    let kept = service.create_estimate(draft_estimate(1), &sales)?;
    let removed = service.create_estimate(draft_estimate(2), &sales)?;
    service.update::<Estimate>(&kept.id, &EstimateDraft::new().set_total_amount(10), &sales)?;
    service.update::<Estimate>(&removed.id, &EstimateDraft::new().set_total_amount(20), &sales)?;

    service.delete::<Estimate>(&removed.id, &sales)?;

    assert!(matches!(
        service
            .list_history::<Estimate>(&removed.id, &sales)
            .unwrap_err(),
        WorkflowError::NotFound { .. }
    ));
    assert_eq!(service.list_history::<Estimate>(&kept.id, &sales)?.len(), 1);
    Ok(())
}

#[test]
fn line_items_change_without_history() -> anyhow::Result<()> {
    let (_dir, service, _) = ledger("test_items.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;

    let estimate = service.create_estimate(draft_estimate(0), &sales)?;
    let item = LineItemDraft::new()
        .set_item_name("scaffolding")
        .set_quantity(4)
        .set_unit_price(2500);

    let with_item: Estimate = service.add_item(&estimate.id, &item, &sales)?;
    assert_eq!(with_item.items.len(), 1);
    assert_eq!(with_item.items[0].subtotal, 10_000);

    let item_id = with_item.items[0].id.clone();
    let without: Estimate = service.remove_item(&estimate.id, &item_id, &sales)?;
    assert!(without.items.is_empty());

    let err = service
        .remove_item::<Estimate>(&estimate.id, &item_id, &sales)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::NotFound {
            entity_type: "LineItem",
            ..
        }
    ));
    assert!(service.list_history::<Estimate>(&estimate.id, &sales)?.is_empty());
    Ok(())
}

struct BrokenSink;

impl AuditSink for BrokenSink {
    fn record(&self, _entry: AuditEntry) -> anyhow::Result<()> {
        Err(anyhow!("audit store offline"))
    }
}

#[test]
fn audit_failure_does_not_fail_the_operation() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(open(temp_dir.path().join("test_broken_audit.db"))?);
    let service = LedgerService::new(db, Arc::new(BrokenSink), Config::default())?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(5), &sales)?;
    let approved: Estimate = service.approve(&estimate.id, &hq)?;

    assert!(approved.approval.is_approved());
    assert_eq!(service.list_history::<Estimate>(&estimate.id, &hq)?.len(), 1);
    Ok(())
}

#[test]
fn audit_log_follows_each_write() -> anyhow::Result<()> {
    let (_dir, service, audit) = ledger("test_audit.db", HistoryRetention::Retain)?;
    let sales = actor(Role::Sales)?;
    let hq = actor(Role::Headquarters)?;

    let estimate = service.create_estimate(draft_estimate(1000), &sales)?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(5), &sales)?;
    service.approve::<Estimate>(&estimate.id, &hq)?;
    service.delete::<Estimate>(&estimate.id, &sales)?;

    let actions: Vec<AuditAction> = audit.entries()?.iter().map(|entry| entry.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Delete,
            AuditAction::Approve,
            AuditAction::Update,
            AuditAction::Create
        ]
    );
    assert!(
        audit
            .entries()?
            .iter()
            .all(|entry| entry.entity_id == estimate.id && entry.entity_type == "Estimate")
    );
    Ok(())
}
