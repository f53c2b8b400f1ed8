//! Contracts, derived from an approved estimate
use crate::access::Resource;
use crate::approval::{Approval, ApprovalStatus};
use crate::document::{LineItem, Versioned};
use crate::error::ValidationError;
use crate::snapshot::{FieldValue, Snapshot};
use crate::types::{CalendarDate, TimeStamp};
use chrono::Utc;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractType {
    #[n(0)]
    Order,
    #[n(1)]
    Contract,
    #[n(2)]
    CompletionConfirmation,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CustomerConfirmation {
    #[default]
    #[n(0)]
    Required,
    #[n(1)]
    NotRequired,
    #[n(2)]
    NotImplemented,
    #[n(3)]
    CompletedOk,
    #[n(4)]
    CompletedNg,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Contract {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub case_id: String,
    #[n(2)]
    pub estimate_id: Option<String>, // the estimate this contract was derived from
    #[n(3)]
    pub contract_type: ContractType,
    #[n(4)]
    pub contract_date: CalendarDate,
    #[n(5)]
    pub contract_amount: u64,
    #[n(6)]
    pub desired_construction_date: Option<CalendarDate>,
    #[n(7)]
    pub payment_terms: Option<String>,
    #[n(8)]
    pub owner_sign_date: Option<CalendarDate>,
    #[n(9)]
    pub approval: Approval,
    #[n(10)]
    pub customer_confirmation_status: CustomerConfirmation,
    #[n(11)]
    pub customer_confirmation_date: Option<CalendarDate>,
    #[n(12)]
    pub customer_confirmation_by: Option<String>,
    #[n(13)]
    pub items: Vec<LineItem>,
    #[n(14)]
    pub created_at: TimeStamp<Utc>,
    #[n(15)]
    pub updated_at: TimeStamp<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractDraft {
    case_id: Option<String>,
    estimate_id: Option<Option<String>>,
    contract_type: Option<ContractType>,
    contract_date: Option<CalendarDate>,
    contract_amount: Option<u64>,
    desired_construction_date: Option<Option<CalendarDate>>,
    payment_terms: Option<Option<String>>,
    owner_sign_date: Option<Option<CalendarDate>>,
    approval_status: Option<ApprovalStatus>,
    customer_confirmation_status: Option<CustomerConfirmation>,
    customer_confirmation_date: Option<Option<CalendarDate>>,
    customer_confirmation_by: Option<Option<String>>,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Order => "Order",
            ContractType::Contract => "Contract",
            ContractType::CompletionConfirmation => "CompletionConfirmation",
        }
    }
}

impl FromStr for ContractType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Order" => Ok(ContractType::Order),
            "Contract" => Ok(ContractType::Contract),
            "CompletionConfirmation" => Ok(ContractType::CompletionConfirmation),
            _ => Err(()),
        }
    }
}

impl CustomerConfirmation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerConfirmation::Required => "Required",
            CustomerConfirmation::NotRequired => "NotRequired",
            CustomerConfirmation::NotImplemented => "NotImplemented",
            CustomerConfirmation::CompletedOk => "CompletedOK",
            CustomerConfirmation::CompletedNg => "CompletedNG",
        }
    }
}

impl FromStr for CustomerConfirmation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Required" => Ok(CustomerConfirmation::Required),
            "NotRequired" => Ok(CustomerConfirmation::NotRequired),
            "NotImplemented" => Ok(CustomerConfirmation::NotImplemented),
            "CompletedOK" => Ok(CustomerConfirmation::CompletedOk),
            "CompletedNG" => Ok(CustomerConfirmation::CompletedNg),
            _ => Err(()),
        }
    }
}

impl ContractDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_case(mut self, case_id: &str) -> Self {
        self.case_id = Some(case_id.to_string());
        self
    }
    pub fn set_estimate(mut self, estimate_id: &str) -> Self {
        self.estimate_id = Some(Some(estimate_id.to_string()));
        self
    }
    pub fn clear_estimate(mut self) -> Self {
        self.estimate_id = Some(None);
        self
    }
    pub fn set_contract_type(mut self, contract_type: ContractType) -> Self {
        self.contract_type = Some(contract_type);
        self
    }
    pub fn set_contract_date(mut self, date: CalendarDate) -> Self {
        self.contract_date = Some(date);
        self
    }
    pub fn set_contract_amount(mut self, amount: u64) -> Self {
        self.contract_amount = Some(amount);
        self
    }
    pub fn set_desired_construction_date(mut self, date: CalendarDate) -> Self {
        self.desired_construction_date = Some(Some(date));
        self
    }
    pub fn set_payment_terms(mut self, terms: &str) -> Self {
        self.payment_terms = Some(Some(terms.to_string()));
        self
    }
    pub fn set_owner_sign_date(mut self, date: CalendarDate) -> Self {
        self.owner_sign_date = Some(Some(date));
        self
    }
    pub fn set_approval_status(mut self, status: ApprovalStatus) -> Self {
        self.approval_status = Some(status);
        self
    }
    pub fn set_customer_confirmation(mut self, status: CustomerConfirmation) -> Self {
        self.customer_confirmation_status = Some(status);
        self
    }
    pub fn set_customer_confirmation_date(mut self, date: CalendarDate) -> Self {
        self.customer_confirmation_date = Some(Some(date));
        self
    }
    pub fn set_customer_confirmation_by(mut self, user_id: &str) -> Self {
        self.customer_confirmation_by = Some(Some(user_id.to_string()));
        self
    }

    /// The estimate reference as it will be stored, `None` when unset.
    pub fn estimate_id(&self) -> Option<&str> {
        self.estimate_id.as_ref().and_then(|id| id.as_deref())
    }

    /// Checks required fields. The estimate gate is applied separately by the service.
    pub fn validate_and_finalise(
        &self,
        id: String,
        now: TimeStamp<Utc>,
    ) -> Result<Contract, ValidationError> {
        let case_id = self
            .case_id
            .clone()
            .ok_or(ValidationError::MissingField("case_id"))?;
        let contract_type = self
            .contract_type
            .ok_or(ValidationError::MissingField("contract_type"))?;
        let contract_date = self
            .contract_date
            .ok_or(ValidationError::MissingField("contract_date"))?;
        let contract_amount = self
            .contract_amount
            .ok_or(ValidationError::MissingField("contract_amount"))?;
        let mut approval = Approval::default();
        if let Some(status) = self.approval_status {
            approval.edit_status(status)?;
        }

        Ok(Contract {
            id,
            case_id,
            estimate_id: self.estimate_id.clone().flatten(),
            contract_type,
            contract_date,
            contract_amount,
            desired_construction_date: self.desired_construction_date.flatten(),
            payment_terms: self.payment_terms.clone().flatten(),
            owner_sign_date: self.owner_sign_date.flatten(),
            approval,
            customer_confirmation_status: self.customer_confirmation_status.unwrap_or_default(),
            customer_confirmation_date: self.customer_confirmation_date.flatten(),
            customer_confirmation_by: self.customer_confirmation_by.clone().flatten(),
            items: vec![],
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

impl Versioned for Contract {
    type Draft = ContractDraft;

    const ENTITY_TYPE: &'static str = "Contract";
    const RESOURCE: Resource = Resource::Contract;
    const ID_PREFIX: &'static str = "contract_";
    const TREE: &'static str = "contracts";
    const HISTORY_TREE: &'static str = "contract_history";
    const WATCH_LIST: &'static [&'static str] = &[
        "contract_amount",
        "approval_status",
        "approval_date",
        "contract_type",
        "customer_confirmation_status",
    ];
    const ESTIMATE_GATED: bool = true;

    fn id(&self) -> &str {
        &self.id
    }
    fn approval(&self) -> &Approval {
        &self.approval
    }
    fn approval_mut(&mut self) -> &mut Approval {
        &mut self.approval
    }
    fn items(&self) -> &[LineItem] {
        &self.items
    }
    fn items_mut(&mut self) -> &mut Vec<LineItem> {
        &mut self.items
    }
    fn touch(&mut self, at: TimeStamp<Utc>) {
        self.updated_at = at;
    }
    fn linked_estimate(&self) -> Option<&str> {
        self.estimate_id.as_deref()
    }

    fn snapshot(&self) -> Snapshot {
        let snapshot = Snapshot::new()
            .with("id", FieldValue::text(&self.id))
            .with("case_id", FieldValue::text(&self.case_id))
            .with(
                "estimate_id",
                FieldValue::optional_text(self.estimate_id.as_deref()),
            )
            .with("contract_type", FieldValue::text(self.contract_type.as_str()))
            .with("contract_date", FieldValue::Date(self.contract_date))
            .with("contract_amount", FieldValue::Amount(self.contract_amount))
            .with(
                "desired_construction_date",
                FieldValue::optional_date(self.desired_construction_date),
            )
            .with(
                "payment_terms",
                FieldValue::optional_text(self.payment_terms.as_deref()),
            )
            .with(
                "owner_sign_date",
                FieldValue::optional_date(self.owner_sign_date),
            )
            .with(
                "customer_confirmation_status",
                FieldValue::text(self.customer_confirmation_status.as_str()),
            )
            .with(
                "customer_confirmation_date",
                FieldValue::optional_date(self.customer_confirmation_date),
            )
            .with(
                "customer_confirmation_by",
                FieldValue::optional_text(self.customer_confirmation_by.as_deref()),
            )
            .with("created_at", FieldValue::Timestamp(self.created_at.clone()))
            .with("updated_at", FieldValue::Timestamp(self.updated_at.clone()));

        self.approval.write_snapshot(snapshot)
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ValidationError> {
        if let Some(Some(case_id)) = snapshot.read_text("case_id")? {
            self.case_id = case_id;
        }
        if let Some(estimate_id) = snapshot.read_text("estimate_id")? {
            self.estimate_id = estimate_id;
        }
        if let Some(contract_type) = snapshot.read_parsed("contract_type")? {
            self.contract_type = contract_type;
        }
        if let Some(Some(date)) = snapshot.read_date("contract_date")? {
            self.contract_date = date;
        }
        if let Some(amount) = snapshot.read_amount("contract_amount")? {
            self.contract_amount = amount;
        }
        if let Some(date) = snapshot.read_date("desired_construction_date")? {
            self.desired_construction_date = date;
        }
        if let Some(terms) = snapshot.read_text("payment_terms")? {
            self.payment_terms = terms;
        }
        if let Some(date) = snapshot.read_date("owner_sign_date")? {
            self.owner_sign_date = date;
        }
        if let Some(status) = snapshot.read_parsed("customer_confirmation_status")? {
            self.customer_confirmation_status = status;
        }
        if let Some(date) = snapshot.read_date("customer_confirmation_date")? {
            self.customer_confirmation_date = date;
        }
        if let Some(by) = snapshot.read_text("customer_confirmation_by")? {
            self.customer_confirmation_by = by;
        }
        self.approval.apply_snapshot(snapshot)
    }

    fn apply_draft(&mut self, draft: &ContractDraft) -> Result<(), ValidationError> {
        if let Some(status) = draft.approval_status {
            self.approval.edit_status(status)?;
        }
        if let Some(case_id) = &draft.case_id {
            self.case_id = case_id.clone();
        }
        if let Some(estimate_id) = &draft.estimate_id {
            self.estimate_id = estimate_id.clone();
        }
        if let Some(contract_type) = draft.contract_type {
            self.contract_type = contract_type;
        }
        if let Some(date) = draft.contract_date {
            self.contract_date = date;
        }
        if let Some(amount) = draft.contract_amount {
            self.contract_amount = amount;
        }
        if let Some(date) = draft.desired_construction_date {
            self.desired_construction_date = date;
        }
        if let Some(terms) = &draft.payment_terms {
            self.payment_terms = terms.clone();
        }
        if let Some(date) = draft.owner_sign_date {
            self.owner_sign_date = date;
        }
        if let Some(status) = draft.customer_confirmation_status {
            self.customer_confirmation_status = status;
        }
        if let Some(date) = draft.customer_confirmation_date {
            self.customer_confirmation_date = date;
        }
        if let Some(by) = &draft.customer_confirmation_by {
            self.customer_confirmation_by = by.clone();
        }
        Ok(())
    }
}
