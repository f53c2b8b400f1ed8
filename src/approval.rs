//! One-way approval transition shared by estimates and contracts
use crate::error::ValidationError;
use crate::snapshot::{FieldValue, Snapshot};
use crate::types::CalendarDate;
use std::fmt;
use std::str::FromStr;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalStatus {
    #[default]
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    // only reachable through a direct field edit, approve() never produces it
    #[n(2)]
    Rejected,
}

/// Status, approver and approval date travel together on every document.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct Approval {
    #[n(0)]
    pub status: ApprovalStatus,
    #[n(1)]
    pub approver: Option<String>,
    #[n(2)]
    pub approval_date: Option<CalendarDate>,
}

/// Raised when approve() is called on a document that is already approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyApproved(pub ApprovalStatus);

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "Pending",
            ApprovalStatus::Approved => "Approved",
            ApprovalStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(ApprovalStatus::Pending),
            "Approved" => Ok(ApprovalStatus::Approved),
            "Rejected" => Ok(ApprovalStatus::Rejected),
            _ => Err(()),
        }
    }
}

impl Approval {
    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    /// Pending (or Rejected) -> Approved. A second call is an error, not a no-op,
    /// and leaves approver and date untouched.
    pub fn approve(&mut self, approver: &str, on: CalendarDate) -> Result<(), AlreadyApproved> {
        if self.is_approved() {
            return Err(AlreadyApproved(self.status));
        }
        self.status = ApprovalStatus::Approved;
        self.approver = Some(approver.to_string());
        self.approval_date = Some(on);
        Ok(())
    }

    /// Direct status edit from a draft. Only Pending and Rejected may be set
    /// this way; reaching or leaving Approved goes through `approve` alone.
    pub fn edit_status(&mut self, status: ApprovalStatus) -> Result<(), ValidationError> {
        if status == self.status {
            return Ok(());
        }
        if self.is_approved() {
            return Err(ValidationError::ApprovalIsFinal(status));
        }
        if status == ApprovalStatus::Approved {
            return Err(ValidationError::ApprovalBypassed);
        }
        self.status = status;
        Ok(())
    }

    pub fn write_snapshot(&self, snapshot: Snapshot) -> Snapshot {
        snapshot
            .with("approval_status", FieldValue::text(self.status.as_str()))
            .with(
                "approver",
                FieldValue::optional_text(self.approver.as_deref()),
            )
            .with(
                "approval_date",
                FieldValue::optional_date(self.approval_date),
            )
    }

    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ValidationError> {
        if let Some(status) = snapshot.read_parsed("approval_status")? {
            self.status = status;
        }
        if let Some(approver) = snapshot.read_text("approver")? {
            self.approver = approver;
        }
        if let Some(date) = snapshot.read_date("approval_date")? {
            self.approval_date = date;
        }
        Ok(())
    }
}
