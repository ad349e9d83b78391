use std::path::{Path, PathBuf};

use crate::aggregation::{AggregationReport, Aggregator, PartitionFailure};
use crate::error::PlannerError;
use crate::frequency::Frequency;
use crate::partition::{PartitionMap, Partitioner};
use crate::schema::LedgerLayout;
use crate::visualization::{self, ChartConfig};
use crate::workbook::{self, Sheet};

/// Everything a pipeline run needs besides the ledger itself.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub layout: LedgerLayout,
    pub frequency: Frequency,
    pub chart: ChartConfig,
}

/// What a full run produced.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub sheets: usize,
    pub partitions: usize,
    pub charts: Vec<PathBuf>,
    /// Partitions with no ledger rows, hence no chart.
    pub empty: Vec<String>,
    pub failures: Vec<PartitionFailure>,
}

/// Ledger pipeline: load sheets, partition, aggregate, render.
///
/// Relative file names are resolved against `base_path`.
pub struct ResourcePlanner {
    base_path: PathBuf,
    config: PipelineConfig,
    sheets: Option<Vec<Sheet>>,
}

impl ResourcePlanner {
    pub fn new(base_path: impl Into<PathBuf>, config: PipelineConfig) -> Result<Self, PlannerError> {
        config.layout.validate()?;
        Ok(Self {
            base_path: base_path.into(),
            config,
            sheets: None,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load a workbook or CSV ledger, replacing any previously loaded sheets.
    pub fn load(&mut self, filename: impl AsRef<Path>) -> Result<&[Sheet], PlannerError> {
        let path = self.base_path.join(filename);
        let sheets = workbook::read_ledger(&path)?;
        Ok(self.sheets.insert(sheets).as_slice())
    }

    /// Use sheets that were read elsewhere.
    pub fn load_sheets(&mut self, sheets: Vec<Sheet>) {
        self.sheets = Some(sheets);
    }

    pub fn sheets(&self) -> Result<&[Sheet], PlannerError> {
        self.sheets
            .as_deref()
            .ok_or_else(|| PlannerError::NotLoaded("ledger sheets".into()))
    }

    // ── Pipeline stages ─────────────────────────────────────────────────────

    pub fn partition(&self) -> Result<PartitionMap, PlannerError> {
        Partitioner::new(self.config.layout).partition_sheets(self.sheets()?)
    }

    /// Partition and aggregate. Sheet-level errors abort; partition-level
    /// errors are returned in the report.
    pub fn aggregate(&self) -> Result<AggregationReport, PlannerError> {
        let partitions = self.partition()?;
        Ok(self.aggregator().aggregate(&partitions))
    }

    pub fn render(
        &self,
        report: &AggregationReport,
        out_dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>, PlannerError> {
        let dir = self.base_path.join(out_dir);
        visualization::write_charts(&dir, report, &self.config.chart)
    }

    /// Load `input`, then partition, aggregate and chart it into `out_dir`.
    pub fn run(
        &mut self,
        input: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
    ) -> Result<RunSummary, PlannerError> {
        let sheets = self.load(input)?.len();
        let partitions = self.partition()?;
        let report = self.aggregator().aggregate(&partitions);
        let charts = self.render(&report, out_dir)?;

        let empty = report
            .series
            .values()
            .filter(|s| s.is_empty())
            .map(|s| s.label.clone())
            .collect();

        log::info!(
            "{} sheets, {} partitions, {} charts, {} failures",
            sheets,
            partitions.len(),
            charts.len(),
            report.failures.len()
        );

        Ok(RunSummary {
            sheets,
            partitions: partitions.len(),
            charts,
            empty,
            failures: report.failures,
        })
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.config.layout, self.config.frequency)
    }
}
