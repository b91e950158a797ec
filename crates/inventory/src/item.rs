use serde::{Deserialize, Serialize};

use binsync_core::{BinId, Entity, ItemId, ProgramId, ValueObject};

/// Item record type as reported by the platform.
///
/// Only stockable inventory parts take part in bin reconciliation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    InventoryPart,
    NonInventoryPart,
    Assembly,
    Kit,
    Service,
}

impl ItemType {
    pub fn is_stockable(self) -> bool {
        matches!(self, ItemType::InventoryPart)
    }
}

/// Min/max replenishment thresholds sourced from the item's class record.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassThresholds {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl ValueObject for ClassThresholds {}

/// Association between an item and one of its bins.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemBin {
    pub bin_id: BinId,
    #[serde(default)]
    pub preferred: bool,
}

/// Inventory item record, as far as this system needs to see it.
///
/// Everything except `error_marker` is read-only from the reconciler's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    /// Item number (the platform's `name` field).
    pub name: String,
    pub item_type: ItemType,
    #[serde(default)]
    pub inactive: bool,
    #[serde(default)]
    pub program_id: Option<ProgramId>,
    #[serde(default)]
    pub quantity_on_hand: f64,
    #[serde(default)]
    pub ninety_day_sales: f64,
    #[serde(default)]
    pub class: Option<ClassThresholds>,
    #[serde(default)]
    pub bins: Vec<ItemBin>,
    /// Last reconciliation failure; empty when the last attempt succeeded.
    #[serde(default)]
    pub error_marker: String,
}

impl InventoryItem {
    pub fn preferred_bins(&self) -> impl Iterator<Item = BinId> + '_ {
        self.bins.iter().filter(|b| b.preferred).map(|b| b.bin_id)
    }

    pub fn thresholds(&self) -> ClassThresholds {
        self.class.unwrap_or_default()
    }

    /// On-hand stock or recent sales activity.
    pub fn has_activity(&self) -> bool {
        self.quantity_on_hand > 0.0 || self.ninety_day_sales > 0.0
    }
}

impl Entity for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Merchandising program an item belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub closed: bool,
}

impl Entity for Program {
    type Id = ProgramId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
