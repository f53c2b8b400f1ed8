//! Human-readable change summaries between consecutive snapshots
use crate::snapshot::Snapshot;

pub const INITIAL_CREATION: &str = "initial creation";
pub const NO_SIGNIFICANT_CHANGE: &str = "no significant change";
const SEPARATOR: &str = " / ";

/// Summarise what changed on the watched fields between `prior` and `current`.
///
/// Values are compared in their stored form, so a representation difference
/// (an amount stored as text in an old snapshot, say) counts as a change.
pub fn diff_summary(watch_list: &[&str], current: &Snapshot, prior: Option<&Snapshot>) -> String {
    let Some(prior) = prior else {
        return INITIAL_CREATION.to_string();
    };

    let changes: Vec<String> = watch_list
        .iter()
        .filter_map(|field| {
            let before = prior.get(field);
            let after = current.get(field);
            (before != after).then(|| format!("{field}: {before} → {after}"))
        })
        .collect();

    if changes.is_empty() {
        NO_SIGNIFICANT_CHANGE.to_string()
    } else {
        changes.join(SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FieldValue;

    const WATCH: &[&str] = &["total_amount", "approval_status"];

    #[test]
    fn first_record_is_initial_creation() {
        let current = Snapshot::new().with("total_amount", FieldValue::Amount(5));
        assert_eq!(diff_summary(WATCH, &current, None), INITIAL_CREATION);
    }

    #[test]
    fn unwatched_changes_are_not_significant() {
        let prior = Snapshot::new()
            .with("total_amount", FieldValue::Amount(5))
            .with("case_id", FieldValue::text("case_1"));
        let current = Snapshot::new()
            .with("total_amount", FieldValue::Amount(5))
            .with("case_id", FieldValue::text("case_2"));

        assert_eq!(
            diff_summary(WATCH, &current, Some(&prior)),
            NO_SIGNIFICANT_CHANGE
        );
    }

    #[test]
    fn changes_follow_watch_list_order() {
        let prior = Snapshot::new()
            .with("total_amount", FieldValue::Amount(1000))
            .with("approval_status", FieldValue::text("Pending"));
        let current = Snapshot::new()
            .with("total_amount", FieldValue::Amount(2000))
            .with("approval_status", FieldValue::text("Approved"));

        assert_eq!(
            diff_summary(WATCH, &current, Some(&prior)),
            "total_amount: 1000 → 2000 / approval_status: Pending → Approved"
        );
    }

    #[test]
    fn field_appearing_counts_as_change() {
        let prior = Snapshot::new().with("total_amount", FieldValue::Amount(1));
        let current = Snapshot::new()
            .with("total_amount", FieldValue::Amount(1))
            .with("approval_status", FieldValue::text("Approved"));

        assert_eq!(
            diff_summary(WATCH, &current, Some(&prior)),
            "approval_status: None → Approved"
        );
    }

    #[test]
    fn representation_differences_are_reported() {
        let prior = Snapshot::new().with("total_amount", FieldValue::text("900000.00"));
        let current = Snapshot::new().with("total_amount", FieldValue::Amount(900000));

        assert_eq!(
            diff_summary(WATCH, &current, Some(&prior)),
            "total_amount: 900000.00 → 900000"
        );
    }
}
