/// Column layout and column-name constants for resource-planner.
/// Single source of truth - also exported to Python via PyO3.

// ── Ledger column positions ─────────────────────────────────────────────────
pub mod ledger {
    pub const DATE_COLUMN_INDEX: usize = 0;
    pub const DELTA_COLUMN_INDEX: usize = 1;
    pub const CATEGORY_COLUMN_1_INDEX: usize = 2;
    pub const CATEGORY_COLUMN_2_INDEX: usize = 3;
}

// ── Aggregated series columns ───────────────────────────────────────────────
pub mod series {
    pub const BIN_END: &str = "bin_end";
    pub const AVAILABLE: &str = "available";
}

// ── Partition labels ────────────────────────────────────────────────────────
pub mod partition {
    pub const LABEL_SEPARATOR: &str = "-";
}

use crate::error::PlannerError;

/// Positional layout of a ledger sheet.
///
/// Ledger sheets are addressed by position, not header name: whatever the
/// headers say, these indices pick the date, delta and the two category
/// columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerLayout {
    pub date_column_index: usize,
    pub delta_column_index: usize,
    pub category_column_1_index: usize,
    pub category_column_2_index: usize,
}

impl Default for LedgerLayout {
    fn default() -> Self {
        Self {
            date_column_index: ledger::DATE_COLUMN_INDEX,
            delta_column_index: ledger::DELTA_COLUMN_INDEX,
            category_column_1_index: ledger::CATEGORY_COLUMN_1_INDEX,
            category_column_2_index: ledger::CATEGORY_COLUMN_2_INDEX,
        }
    }
}

impl LedgerLayout {
    /// Minimum number of columns a sheet needs for this layout.
    pub fn min_columns(&self) -> usize {
        self.indices().into_iter().max().unwrap_or(0) + 1
    }

    /// Reject layouts that point two roles at the same column.
    pub fn validate(&self) -> Result<(), PlannerError> {
        let indices = self.indices();
        for (i, a) in indices.iter().enumerate() {
            if indices[i + 1..].contains(a) {
                return Err(PlannerError::Config(format!(
                    "column index {a} is assigned to more than one ledger role"
                )));
            }
        }
        Ok(())
    }

    fn indices(&self) -> [usize; 4] {
        [
            self.date_column_index,
            self.delta_column_index,
            self.category_column_1_index,
            self.category_column_2_index,
        ]
    }
}
