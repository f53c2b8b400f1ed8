//! Contract creation gate: the linked estimate must already be approved
use crate::approval::Approval;
use crate::error::ValidationError;

/// Whether the estimate gate is enforced. Only rollback passes `Bypass`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ValidationMode {
    Enforce,
    Bypass,
}

/// `estimate` is the approval block of the referenced estimate, `None` when the
/// contract names no estimate or the estimate does not exist.
pub(crate) fn admit_contract(
    estimate: Option<&Approval>,
    mode: ValidationMode,
) -> Result<(), ValidationError> {
    if mode == ValidationMode::Bypass {
        tracing::debug!("contract estimate gate bypassed");
        return Ok(());
    }
    let estimate = estimate.ok_or(ValidationError::MissingEstimate)?;
    if !estimate.is_approved() {
        return Err(ValidationError::EstimateNotApproved);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalStatus;
    use crate::types::CalendarDate;

    #[test]
    fn pending_estimate_is_refused() {
        let pending = Approval::default();
        assert_eq!(
            admit_contract(Some(&pending), ValidationMode::Enforce),
            Err(ValidationError::EstimateNotApproved)
        );
    }

    #[test]
    fn missing_estimate_is_refused() {
        assert_eq!(
            admit_contract(None, ValidationMode::Enforce),
            Err(ValidationError::MissingEstimate)
        );
    }

    #[test]
    fn approved_estimate_is_admitted() {
        let mut approved = Approval::default();
        approved.approve("user_hq", CalendarDate::today()).unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);

        assert!(admit_contract(Some(&approved), ValidationMode::Enforce).is_ok());
    }

    #[test]
    fn bypass_admits_anything() {
        let rejected = Approval {
            status: ApprovalStatus::Rejected,
            ..Default::default()
        };
        assert!(admit_contract(Some(&rejected), ValidationMode::Bypass).is_ok());
        assert!(admit_contract(None, ValidationMode::Bypass).is_ok());
    }
}
