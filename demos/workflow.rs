// Walks one case from estimate to contract: edits, approval, the contract
// gate, history with diffs and a rollback. Run with RUST_LOG=debug for the
// bypassed gate on rollback.
use anyhow::Context;
use document_ledger::{
    Actor, Config, Contract, ContractDraft, ContractType, Estimate, EstimateDraft,
    LedgerService, Role, types::CalendarDate, utils,
};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let temp_dir = TempDir::new()?;
    let config = Config::default().with_db_path(temp_dir.path().join("ledger.db"));
    let service = LedgerService::open(config)?;

    let sales = Actor::new(utils::new_uuid_to_bech32("user_")?, Role::Sales);
    let hq = Actor::new(utils::new_uuid_to_bech32("user_")?, Role::Headquarters);

    let estimate = service.create_estimate(
        EstimateDraft::new()
            .set_case("case_roof_repair")
            .set_total_amount(850_000)
            .set_valid_until(CalendarDate::from_ymd(2025, 12, 31).context("bad date")?),
        &sales,
    )?;
    service.update::<Estimate>(&estimate.id, &EstimateDraft::new().set_total_amount(900_000), &sales)?;

    let contract_draft = ContractDraft::new()
        .set_case("case_roof_repair")
        .set_estimate(&estimate.id)
        .set_contract_type(ContractType::Contract)
        .set_contract_date(CalendarDate::today())
        .set_contract_amount(900_000);

    if let Err(err) = service.create_contract(contract_draft.clone(), &sales) {
        println!("contract refused: {err}");
    }

    service.approve::<Estimate>(&estimate.id, &hq)?;
    let contract = service.create_contract(contract_draft, &sales)?;
    println!("contract {} created", contract.id);

    service.update::<Contract>(&contract.id, &ContractDraft::new().set_contract_amount(880_000), &sales)?;

    println!("estimate history:");
    for view in service.history_with_diffs::<Estimate>(&estimate.id, &hq)? {
        println!("  v{} {}  {}", view.record.version, view.record.changed_at, view.diff_summary);
    }

    let history = service.list_history::<Contract>(&contract.id, &hq)?;
    let first = history.last().context("contract has no history")?;
    let restored: Contract = service.rollback(&contract.id, &first.id, &hq)?;
    println!("contract amount restored to {}", restored.contract_amount);

    Ok(())
}
