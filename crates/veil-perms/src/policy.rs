//! Tiers and the tier access policy.

use serde::{Deserialize, Serialize};

use veil_core::{CreatorId, TierId, Zatoshis};

/// A creator's subscription tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub id: TierId,
    pub creator_id: CreatorId,
    pub name: String,
    /// Minimum payment that buys one period.
    pub price: Zatoshis,
    /// Display position; higher ranks include lower ones under
    /// [`TierAccessPolicy::OrderedSuperset`].
    pub rank: u32,
    /// Inactive tiers no longer accept payments.
    pub active: bool,
}

/// Which content tiers a grant for a given tier unlocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierAccessPolicy {
    /// Only content of exactly the granted tier (plus untiered content).
    #[default]
    ExactMatch,
    /// Content of the granted tier or any tier of the same creator with a
    /// rank not above it (plus untiered content).
    OrderedSuperset,
}

impl TierAccessPolicy {
    /// Whether a grant for `granted` may read content tagged `required`.
    ///
    /// `tiers` is the creator's tier list, used for rank lookups. Content
    /// with no tier is open to every paying supporter.
    pub fn allows(&self, granted: &TierId, required: Option<&TierId>, tiers: &[Tier]) -> bool {
        let required = match required {
            None => return true,
            Some(r) => r,
        };
        if required == granted {
            return true;
        }
        match self {
            TierAccessPolicy::ExactMatch => false,
            TierAccessPolicy::OrderedSuperset => {
                let rank = |id: &TierId| tiers.iter().find(|t| &t.id == id).map(|t| t.rank);
                match (rank(granted), rank(required)) {
                    (Some(have), Some(need)) => have >= need,
                    _ => false,
                }
            }
        }
    }
}
