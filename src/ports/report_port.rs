//! Report generation port trait.

use std::path::Path;

use crate::domain::error::PapertraderError;
use crate::domain::metrics::BacktestReport;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), PapertraderError>;
}
