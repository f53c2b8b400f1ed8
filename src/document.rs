//! The seam shared by every document family that keeps a version history
use crate::access::Resource;
use crate::approval::Approval;
use crate::error::ValidationError;
use crate::snapshot::Snapshot;
use crate::types::TimeStamp;
use chrono::Utc;

/// A document whose state is snapshotted before every update or delete.
///
/// Implementors decide which fields make up a snapshot and how a snapshot is
/// written back. Everything else (history, diffing, approval, rollback) is
/// driven generically by the service.
pub trait Versioned:
    Clone + std::fmt::Debug + minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()>
{
    /// Partial field set used for updates.
    type Draft: Clone;

    /// Name used in audit entries and error messages.
    const ENTITY_TYPE: &'static str;
    const RESOURCE: Resource;
    /// bech32 hrp for new identifiers.
    const ID_PREFIX: &'static str;
    const TREE: &'static str;
    const HISTORY_TREE: &'static str;
    /// Fields compared when summarising the change between two versions.
    const WATCH_LIST: &'static [&'static str];
    /// Creation requires the linked estimate to be approved.
    const ESTIMATE_GATED: bool = false;

    fn id(&self) -> &str;
    fn approval(&self) -> &Approval;
    fn approval_mut(&mut self) -> &mut Approval;
    fn items(&self) -> &[LineItem];
    fn items_mut(&mut self) -> &mut Vec<LineItem>;
    fn touch(&mut self, at: TimeStamp<Utc>);
    fn linked_estimate(&self) -> Option<&str> {
        None
    }

    fn snapshot(&self) -> Snapshot;
    /// Write every writable field present in `snapshot` back onto `self`.
    fn apply_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), ValidationError>;
    /// Apply the fields a draft provides, leaving the rest untouched. A refused
    /// status edit leaves the document unchanged.
    fn apply_draft(&mut self, draft: &Self::Draft) -> Result<(), ValidationError>;
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub item_name: String,
    #[n(2)]
    pub quantity: u32,
    #[n(3)]
    pub unit_price: u64,
    #[n(4)]
    pub subtotal: u64, // quantity * unit_price
}

#[derive(Debug, Clone, Default)]
pub struct LineItemDraft {
    item_name: Option<String>,
    quantity: u32,
    unit_price: u64,
}

impl LineItemDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_item_name(mut self, name: &str) -> Self {
        self.item_name = Some(name.to_string());
        self
    }
    pub fn set_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
    pub fn set_unit_price(mut self, price: u64) -> Self {
        self.unit_price = price;
        self
    }
    pub fn validate_and_finalise(&self, id: String) -> Result<LineItem, ValidationError> {
        let item_name = self
            .item_name
            .clone()
            .ok_or(ValidationError::MissingField("item_name"))?;
        if self.quantity == 0 {
            return Err(ValidationError::ZeroQuantity);
        }
        let subtotal = self
            .unit_price
            .checked_mul(u64::from(self.quantity))
            .ok_or(ValidationError::SubtotalOverflow)?;

        Ok(LineItem {
            id,
            item_name,
            quantity: self.quantity,
            unit_price: self.unit_price,
            subtotal,
        })
    }
}
