use std::collections::HashMap;

use pyo3::prelude::*;
use pyo3::types::PyModule;
use pyo3_polars::PyDataFrame;

use crate::aggregation::{AggregationReport, Aggregator};
use crate::frequency::Frequency;
use crate::model::{PipelineConfig, ResourcePlanner};
use crate::partition::Partitioner;
use crate::schema::{self, LedgerLayout};
use crate::workbook::Sheet;

type SeriesFrames = HashMap<String, PyDataFrame>;
type Failures = Vec<(String, String)>;

#[pyclass(name = "ResourcePlanner")]
pub struct PyResourcePlanner {
    inner: ResourcePlanner,
}

#[pymethods]
impl PyResourcePlanner {
    #[new]
    #[pyo3(signature = (base_path, frequency = "M"))]
    fn new(base_path: String, frequency: &str) -> PyResult<Self> {
        let config = PipelineConfig {
            frequency: frequency.parse::<Frequency>()?,
            ..Default::default()
        };
        Ok(Self {
            inner: ResourcePlanner::new(base_path, config)?,
        })
    }

    /// Load a workbook or CSV ledger. Returns the (lower-cased) sheet names.
    fn load(&mut self, filename: &str) -> PyResult<Vec<String>> {
        let sheets = self.inner.load(filename)?;
        Ok(sheets.iter().map(|s| s.name.clone()).collect())
    }

    /// Partition label -> partition table.
    fn partition(&self) -> PyResult<HashMap<String, PyDataFrame>> {
        let partitions = self.inner.partition()?;
        Ok(partitions
            .into_iter()
            .map(|(label, df)| (label, PyDataFrame(df)))
            .collect())
    }

    /// Returns `(series, failures)`: label -> `bin_end`/`available` frame,
    /// and `(label, reason)` for every partition that could not be parsed.
    fn aggregate(&self) -> PyResult<(SeriesFrames, Failures)> {
        let report = self.inner.aggregate()?;
        report_to_py(report)
    }

    /// Write one SVG chart per non-empty partition. Returns the file paths.
    fn render(&self, out_dir: &str) -> PyResult<Vec<String>> {
        let report = self.inner.aggregate()?;
        let written = self.inner.render(&report, out_dir)?;
        Ok(written
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect())
    }

    #[getter]
    fn frequency(&self) -> String {
        self.inner.config().frequency.to_string()
    }
}

/// Partition and aggregate a single ledger frame.
#[pyfunction]
#[pyo3(signature = (df, frequency = "M"))]
fn aggregate_frame(df: PyDataFrame, frequency: &str) -> PyResult<(SeriesFrames, Failures)> {
    let frequency: Frequency = frequency.parse()?;
    let layout = LedgerLayout::default();
    let sheet = Sheet {
        name: "frame".to_string(),
        table: df.0,
    };
    let partitions = Partitioner::new(layout).partition_sheets(&[sheet])?;
    report_to_py(Aggregator::new(layout, frequency).aggregate(&partitions))
}

fn report_to_py(report: AggregationReport) -> PyResult<(SeriesFrames, Failures)> {
    let mut frames = HashMap::with_capacity(report.series.len());
    for (label, series) in &report.series {
        frames.insert(label.clone(), PyDataFrame(series.to_dataframe()?));
    }
    let failures = report
        .failures
        .into_iter()
        .map(|f| (f.label, f.error.to_string()))
        .collect();
    Ok((frames, failures))
}

/// Export column names and frequency tokens as Python submodules
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    let series = PyModule::new(m.py(), "series")?;
    series.add("BIN_END", schema::series::BIN_END)?;
    series.add("AVAILABLE", schema::series::AVAILABLE)?;
    m.add_submodule(&series)?;

    let frequency = PyModule::new(m.py(), "frequency")?;
    for freq in Frequency::ALL {
        let name = match freq {
            Frequency::SevenDays => "SEVEN_DAYS",
            Frequency::FourteenDays => "FOURTEEN_DAYS",
            Frequency::TwentyEightDays => "TWENTY_EIGHT_DAYS",
            Frequency::Month => "MONTH",
            Frequency::Quarter => "QUARTER",
        };
        frequency.add(name, freq.token())?;
    }
    m.add_submodule(&frequency)?;

    Ok(())
}

#[pymodule]
#[pyo3(name = "_core")]
fn core_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyResourcePlanner>()?;
    m.add_function(wrap_pyfunction!(aggregate_frame, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
