//! Estimates: the first approvable document of a case
use crate::access::Resource;
use crate::approval::{Approval, ApprovalStatus};
use crate::document::{LineItem, Versioned};
use crate::error::ValidationError;
use crate::snapshot::{FieldValue, Snapshot};
use crate::types::{CalendarDate, TimeStamp};
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Estimate {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub case_id: String,
    #[n(2)]
    pub created_date: CalendarDate,
    #[n(3)]
    pub valid_until: Option<CalendarDate>,
    #[n(4)]
    pub total_amount: u64, // whole currency units
    #[n(5)]
    pub approval: Approval,
    #[n(6)]
    pub items: Vec<LineItem>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub updated_at: TimeStamp<Utc>,
}

// Used both to create an estimate and to carry a partial update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EstimateDraft {
    case_id: Option<String>,
    valid_until: Option<Option<CalendarDate>>,
    total_amount: Option<u64>,
    approval_status: Option<ApprovalStatus>,
}

impl EstimateDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_case(mut self, case_id: &str) -> Self {
        self.case_id = Some(case_id.to_string());
        self
    }
    pub fn set_valid_until(mut self, date: CalendarDate) -> Self {
        self.valid_until = Some(Some(date));
        self
    }
    pub fn clear_valid_until(mut self) -> Self {
        self.valid_until = Some(None);
        self
    }
    pub fn set_total_amount(mut self, amount: u64) -> Self {
        self.total_amount = Some(amount);
        self
    }
    /// Direct status edit between Pending and Rejected.
    pub fn set_approval_status(mut self, status: ApprovalStatus) -> Self {
        self.approval_status = Some(status);
        self
    }

    pub fn validate_and_finalise(
        &self,
        id: String,
        now: TimeStamp<Utc>,
    ) -> Result<Estimate, ValidationError> {
        let case_id = self
            .case_id
            .clone()
            .ok_or(ValidationError::MissingField("case_id"))?;
        let mut approval = Approval::default();
        if let Some(status) = self.approval_status {
            approval.edit_status(status)?;
        }

        Ok(Estimate {
            id,
            case_id,
            created_date: now.date(),
            valid_until: self.valid_until.flatten(),
            total_amount: self.total_amount.unwrap_or(0),
            approval,
            items: vec![],
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

impl Versioned for Estimate {
    type Draft = EstimateDraft;

    const ENTITY_TYPE: &'static str = "Estimate";
    const RESOURCE: Resource = Resource::Estimate;
    const ID_PREFIX: &'static str = "estimate_";
    const TREE: &'static str = "estimates";
    const HISTORY_TREE: &'static str = "estimate_history";
    const WATCH_LIST: &'static [&'static str] = &[
        "total_amount",
        "approval_status",
        "approval_date",
        "valid_until",
    ];

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

    fn snapshot(&self) -> Snapshot {
        let snapshot = Snapshot::new()
            .with("id", FieldValue::text(&self.id))
            .with("case_id", FieldValue::text(&self.case_id))
            .with("created_date", FieldValue::Date(self.created_date))
            .with("valid_until", FieldValue::optional_date(self.valid_until))
            .with("total_amount", FieldValue::Amount(self.total_amount))
            .with("created_at", FieldValue::Timestamp(self.created_at.clone()))
            .with("updated_at", FieldValue::Timestamp(self.updated_at.clone()));

        self.approval.write_snapshot(snapshot)
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ValidationError> {
        // id, created_date and the timestamps are read-only
        if let Some(Some(case_id)) = snapshot.read_text("case_id")? {
            self.case_id = case_id;
        }
        if let Some(valid_until) = snapshot.read_date("valid_until")? {
            self.valid_until = valid_until;
        }
        if let Some(amount) = snapshot.read_amount("total_amount")? {
            self.total_amount = amount;
        }
        self.approval.apply_snapshot(snapshot)
    }

    fn apply_draft(&mut self, draft: &EstimateDraft) -> Result<(), ValidationError> {
        if let Some(status) = draft.approval_status {
            self.approval.edit_status(status)?;
        }
        if let Some(case_id) = &draft.case_id {
            self.case_id = case_id.clone();
        }
        if let Some(valid_until) = draft.valid_until {
            self.valid_until = valid_until;
        }
        if let Some(amount) = draft.total_amount {
            self.total_amount = amount;
        }
        Ok(())
    }
}
