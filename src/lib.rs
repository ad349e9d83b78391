//! Partition a resource-availability ledger by every pair of category
//! values and turn each partition into a cumulative series at a calendar
//! frequency, ready to chart.

pub mod aggregation;
pub mod error;
pub mod frequency;
pub mod model;
pub mod partition;
pub mod schema;
pub mod visualization;
pub mod workbook;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod test_util;

pub use aggregation::{AggregatedSeries, AggregationReport, Aggregator, PartitionFailure, SeriesPoint};
pub use error::PlannerError;
pub use frequency::Frequency;
pub use model::{PipelineConfig, ResourcePlanner, RunSummary};
pub use partition::{Partition, PartitionMap, Partitioner};
pub use schema::LedgerLayout;
pub use visualization::ChartConfig;
pub use workbook::Sheet;
