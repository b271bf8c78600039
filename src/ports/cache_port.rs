//! Derived-series cache port trait.

use crate::domain::error::DepotError;
use crate::domain::position::PositionSeries;
use crate::domain::snapshot::SnapshotId;

/// Cache of position series keyed by snapshot identity. Invalidation is
/// always wholesale.
pub trait SeriesCachePort {
    /// Stored positions, only if they were stored under `snapshot`.
    fn load_positions(&self, snapshot: &SnapshotId) -> Result<Option<PositionSeries>, DepotError>;

    /// Replaces the whole cache with `positions` under `snapshot`.
    fn store_positions(
        &self,
        snapshot: &SnapshotId,
        positions: &PositionSeries,
    ) -> Result<(), DepotError>;

    fn invalidate(&self) -> Result<(), DepotError>;
}
