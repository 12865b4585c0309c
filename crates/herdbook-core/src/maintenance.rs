use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::MeasurementStore;
use crate::types::StoreCounts;

/// What a wipe would remove, captured before anything is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WipePlan {
    pub counts: StoreCounts,
}

impl WipePlan {
    pub fn is_empty(&self) -> bool {
        self.counts.total() == 0
    }
}

pub async fn plan_wipe(store: &dyn MeasurementStore) -> Result<WipePlan, StoreError> {
    let counts = store.counts().await?;
    Ok(WipePlan { counts })
}

/// Deletes every record. Returns what was actually removed, which can differ
/// from the plan if writes landed in between.
pub async fn apply_wipe(
    store: &dyn MeasurementStore,
    plan: &WipePlan,
) -> Result<StoreCounts, StoreError> {
    let removed = store.wipe_all().await?;
    if removed != plan.counts {
        warn!(
            planned = plan.counts.total(),
            removed = removed.total(),
            "Store changed between planning and applying the wipe"
        );
    }
    info!(
        cows = removed.cows,
        sensors = removed.sensors,
        measurements = removed.measurements,
        "Wipe applied"
    );
    Ok(removed)
}
