//! Offline ETL: yearly regulator archives → one reconciled table per statement type.

pub mod archive;
pub mod reconciler;

use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::{error, info};

use crate::models::StatementType;

pub use archive::{MemorySource, YearTables, YearlySource, ZipArchiveSource};
pub use reconciler::{reconcile_year, ReconcileOutcome, ReconciledTable, StatementReconciler};

/// Years covered by the ETL: `current - history ..= current`
pub fn years_to_process(current_year: i32, history_years: i32) -> RangeInclusive<i32> {
    (current_year - history_years.max(0))..=current_year
}

/// Result of one full ETL pass
#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub outcomes: Vec<ReconcileOutcome>,
    pub failures: Vec<(StatementType, String)>,
}

impl UpdateSummary {
    /// Statement types that produced a non-empty table
    pub fn generated(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_empty()).count()
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.generated() > 0
    }

    pub fn is_complete(&self) -> bool {
        self.generated() == self.attempted()
    }
}

/// Reconcile every statement type into `output_dir`; a failing type never stops the others
pub fn run_update<S: YearlySource>(
    reconciler: &StatementReconciler<S>,
    statement_types: &[StatementType],
    years: RangeInclusive<i32>,
    filter: &HashSet<i64>,
    output_dir: &Path,
) -> UpdateSummary {
    let mut summary = UpdateSummary::default();

    for &statement_type in statement_types {
        let output_path = output_dir.join(statement_type.output_file_name());
        match reconciler.reconcile_to_file(statement_type, years.clone(), filter, &output_path) {
            Ok(outcome) => summary.outcomes.push(outcome),
            Err(e) => {
                error!("❌ Critical error while writing {}: {:#}", statement_type, e);
                summary.failures.push((statement_type, e.to_string()));
            }
        }
    }

    info!(
        "📊 {} of {} statement tables generated",
        summary.generated(),
        summary.attempted()
    );
    summary
}
