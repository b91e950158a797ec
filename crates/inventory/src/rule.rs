use serde::{Deserialize, Serialize};

use binsync_core::{BinId, Entity, ItemId, LocationId, RuleId};

use crate::bin::BinLabel;
use crate::item::ClassThresholds;

/// Status list value on a bin enhancement record.
///
/// Every write from this system sets `Active`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Disabled,
}

impl RuleStatus {
    /// Internal list id used by the platform.
    pub fn list_id(self) -> u32 {
        match self {
            RuleStatus::Active => 1,
            RuleStatus::Disabled => 2,
        }
    }
}

/// Bin enhancement (replenishment rule) record linked to one inventory item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinRule {
    pub id: RuleId,
    pub item_id: ItemId,
    pub bin_id: Option<BinId>,
    pub location_id: LocationId,
    pub status: RuleStatus,
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Record-level inactive flag; inactive rules are invisible to lookups.
    #[serde(default)]
    pub inactive: bool,
}

impl BinRule {
    pub fn thresholds(&self) -> ClassThresholds {
        ClassThresholds {
            min: self.min,
            max: self.max,
        }
    }
}

impl Entity for BinRule {
    type Id = RuleId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// Field values for a rule that does not exist yet.
///
/// The bin is given by label; the store resolves it to a bin id at save time
/// and fails the create when the label does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBinRule {
    pub item_id: ItemId,
    pub bin_label: BinLabel,
    pub location_id: LocationId,
    pub status: RuleStatus,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Partial update of an existing rule. Only these fields are touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RulePatch {
    pub bin_id: BinId,
    pub location_id: LocationId,
    pub status: RuleStatus,
    pub min: Option<i64>,
    pub max: Option<i64>,
}
