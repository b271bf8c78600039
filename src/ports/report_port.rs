//! Report export port trait.

use crate::domain::error::DepotError;
use crate::domain::pipeline::RunOutput;

/// Port for writing the tabular outputs of a run.
pub trait ReportPort {
    /// Returns the number of tables written.
    fn write(&self, output: &RunOutput) -> Result<usize, DepotError>;
}
