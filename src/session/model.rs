use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::foundation::error::{ImprintError, ImprintResult};
use crate::foundation::ids::{ItemId, MAX_SLOTS, SessionId, SlotIndex};

/// The catalog product an item refers to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    /// Supplier SKU.
    pub sku: String,
    /// Display title.
    pub title: String,
}

/// Optional product variant choice (color, size, …).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Variant dimension, e.g. `"color"`.
    pub kind: String,
    /// Machine value, e.g. `"#1d4ed8"`.
    pub value: String,
    /// Human label, e.g. `"Royal blue"`.
    pub label: String,
}

fn default_quantity() -> u32 {
    100
}

fn default_width_cm() -> f64 {
    5.0
}

/// Item metadata as entered in the editor, before a slot is assigned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItemDraft {
    /// The product being printed on.
    pub product: ProductRef,
    /// Print run size; must be positive.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Requested print width in centimeters; must be positive.
    #[serde(default = "default_width_cm")]
    pub width_cm: f64,
    /// Reference to the uploaded logo artifact.
    pub logo_ref: String,
    /// Reference to the composited mockup artifact.
    pub composite_ref: String,
    /// Optional variant choice.
    #[serde(default)]
    pub variant: Option<Variant>,
}

impl OrderItemDraft {
    /// Validate business rules before any remote work happens.
    pub fn validate(&self) -> ImprintResult<()> {
        if self.quantity == 0 {
            return Err(ImprintError::validation("item quantity must be > 0"));
        }
        if !self.width_cm.is_finite() || self.width_cm <= 0.0 {
            return Err(ImprintError::validation("item width_cm must be > 0"));
        }
        Ok(())
    }
}

/// An item committed to the session, occupying one slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Local item id.
    pub id: ItemId,
    /// The cart position this item occupies.
    pub slot: SlotIndex,
    /// The product being printed on.
    pub product: ProductRef,
    /// Print run size.
    pub quantity: u32,
    /// Print width in centimeters.
    pub width_cm: f64,
    /// Reference to the uploaded logo artifact.
    pub logo_ref: String,
    /// Reference to the composited mockup artifact.
    pub composite_ref: String,
    /// Optional variant choice.
    #[serde(default)]
    pub variant: Option<Variant>,
}

impl OrderItem {
    pub(crate) fn from_draft(draft: OrderItemDraft, slot: SlotIndex) -> Self {
        Self {
            id: ItemId::generate(),
            slot,
            product: draft.product,
            quantity: draft.quantity,
            width_cm: draft.width_cm,
            logo_ref: draft.logo_ref,
            composite_ref: draft.composite_ref,
            variant: draft.variant,
        }
    }
}

/// Print process the shop will run the job with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintMethod {
    /// Direct-to-film transfer.
    #[default]
    Dtf,
    /// UV print.
    Uv,
    /// Combined DTF + UV.
    DtfUv,
}

/// Fulfillment details submitted with `finalize`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalizeMetadata {
    /// Job or customer name; required.
    pub job_name: String,
    /// Requested deadline, free-form date string.
    #[serde(default)]
    pub deadline: String,
    /// Print method.
    #[serde(default)]
    pub method: PrintMethod,
    /// Free-form notes to the shop.
    #[serde(default)]
    pub notes: String,
    /// The shopper's explicit confirmation checkbox; must be true.
    #[serde(default)]
    pub final_check: bool,
}

impl FinalizeMetadata {
    /// Validate the form rules: a job name and an explicit confirmation.
    pub fn validate(&self) -> ImprintResult<()> {
        if self.job_name.trim().is_empty() {
            return Err(ImprintError::validation("finalize job_name must be non-empty"));
        }
        if !self.final_check {
            return Err(ImprintError::validation(
                "finalize requires the order details to be confirmed",
            ));
        }
        Ok(())
    }
}

/// Coarse session phase, derived from the item count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// No items yet.
    Empty,
    /// One to four items.
    Active,
    /// All five slots used.
    Full,
}

/// The local order state mirrored to durable storage.
///
/// Invariants: `used_slots.len() == items.len()`, every item's slot is in
/// `used_slots`, and no two items share a slot.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderSession {
    /// Remote session id, assigned lazily on the first successful add.
    #[serde(default)]
    pub session_id: Option<SessionId>,
    /// Committed items, in add order.
    #[serde(default)]
    pub items: Vec<OrderItem>,
    /// Occupied cart positions.
    #[serde(default)]
    pub used_slots: BTreeSet<SlotIndex>,
}

impl OrderSession {
    /// The smallest unoccupied slot, or `None` when all five are used.
    pub fn lowest_free_slot(&self) -> Option<SlotIndex> {
        SlotIndex::all().find(|slot| !self.used_slots.contains(slot))
    }

    /// `true` once all five slots are used.
    pub fn is_full(&self) -> bool {
        self.used_slots.len() >= MAX_SLOTS as usize
    }

    /// Coarse phase of the state machine.
    pub fn phase(&self) -> SessionPhase {
        if self.is_full() {
            SessionPhase::Full
        } else if self.items.is_empty() {
            SessionPhase::Empty
        } else {
            SessionPhase::Active
        }
    }

    /// Check the slot/item invariants. Used when rehydrating a mirror that
    /// may have been written by an older or corrupted client.
    pub fn validate(&self) -> ImprintResult<()> {
        if self.items.len() != self.used_slots.len() {
            return Err(ImprintError::validation(
                "session items and used slots are out of step",
            ));
        }
        let mut seen = BTreeSet::new();
        for item in &self.items {
            if !self.used_slots.contains(&item.slot) {
                return Err(ImprintError::validation(format!(
                    "item {} sits in unclaimed slot {}",
                    item.id.as_str(),
                    item.slot
                )));
            }
            if !seen.insert(item.slot) {
                return Err(ImprintError::validation(format!(
                    "slot {} is claimed by more than one item",
                    item.slot
                )));
            }
        }
        Ok(())
    }
}
