use std::collections::{BTreeMap, HashMap, HashSet};

use polars::prelude::*;

use crate::error::PlannerError;
use crate::schema::{partition, LedgerLayout};
use crate::workbook::Sheet;

/// Partition label → partition table, merged across sheets.
pub type PartitionMap = BTreeMap<String, DataFrame>;

/// One cell of the category cross-product.
#[derive(Debug, Clone)]
pub struct Partition {
    pub label: String,
    pub category_1: String,
    pub category_2: String,
    /// Matching ledger rows in source order; zero rows for pairs that never
    /// occur together.
    pub table: DataFrame,
}

/// Splits ledger sheets into one table per pair of category values.
///
/// The key space is the full cross-product of the distinct values of the
/// two category columns, not only the pairs present in the data.
pub struct Partitioner {
    layout: LedgerLayout,
}

impl Partitioner {
    pub fn new(layout: LedgerLayout) -> Self {
        Self { layout }
    }

    /// Partition a single sheet.
    ///
    /// Fails with a schema error if the sheet is narrower than the layout
    /// requires.
    pub fn partition_sheet(
        &self,
        sheet_name: &str,
        df: &DataFrame,
    ) -> Result<Vec<Partition>, PlannerError> {
        let required = self.layout.min_columns();
        if df.width() < required {
            return Err(PlannerError::schema(
                sheet_name,
                format!(
                    "expected at least {required} columns, found {}",
                    df.width()
                ),
            ));
        }

        let keys_1 = category_keys(sheet_name, df, self.layout.category_column_1_index)?;
        let keys_2 = category_keys(sheet_name, df, self.layout.category_column_2_index)?;
        let distinct_1 = first_seen_distinct(&keys_1);
        let distinct_2 = first_seen_distinct(&keys_2);

        let mut partitions = Vec::with_capacity(distinct_1.len() * distinct_2.len());
        for v1 in &distinct_1 {
            for v2 in &distinct_2 {
                let mask: Vec<bool> = keys_1
                    .iter()
                    .zip(&keys_2)
                    .map(|(a, b)| a == v1 && b == v2)
                    .collect();
                let mask = BooleanChunked::from_slice("partition_mask".into(), &mask);
                let table = df.filter(&mask)?;

                partitions.push(Partition {
                    label: partition_label(v1, v2),
                    category_1: v1.to_string(),
                    category_2: v2.to_string(),
                    table,
                });
            }
        }

        log::debug!(
            "sheet '{}': {} x {} category values -> {} partitions",
            sheet_name,
            distinct_1.len(),
            distinct_2.len(),
            partitions.len()
        );
        Ok(partitions)
    }

    /// Partition every sheet and merge the results into one flat map.
    ///
    /// Labels are not namespaced by sheet: when two sheets (or two value
    /// pairs that stringify alike) produce the same label, the partition
    /// seen last replaces the earlier one.
    pub fn partition_sheets(&self, sheets: &[Sheet]) -> Result<PartitionMap, PlannerError> {
        let mut merged = PartitionMap::new();
        let mut origin: HashMap<String, String> = HashMap::new();

        for sheet in sheets {
            for p in self.partition_sheet(&sheet.name, &sheet.table)? {
                if let Some(previous) = origin.insert(p.label.clone(), sheet.name.clone()) {
                    log::warn!(
                        "partition '{}' from sheet '{}' overwrites the one from sheet '{}'",
                        p.label,
                        sheet.name,
                        previous
                    );
                }
                merged.insert(p.label, p.table);
            }
        }

        Ok(merged)
    }
}

/// Composite label for a pair of category values.
pub fn partition_label(category_1: &str, category_2: &str) -> String {
    format!("{category_1}{}{category_2}", partition::LABEL_SEPARATOR)
}

/// String rendering of every cell in a category column; nulls become "".
fn category_keys(
    sheet_name: &str,
    df: &DataFrame,
    index: usize,
) -> Result<Vec<String>, PlannerError> {
    let column = df.get_columns().get(index).ok_or_else(|| {
        PlannerError::schema(sheet_name, format!("category column {index} not present"))
    })?;
    let as_str = column.cast(&DataType::String).map_err(|e| {
        PlannerError::schema(
            sheet_name,
            format!("category column '{}' is not comparable: {e}", column.name()),
        )
    })?;

    Ok(as_str
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or("").to_string())
        .collect())
}

fn first_seen_distinct(keys: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    keys.iter()
        .map(|k| k.as_str())
        .filter(|k| seen.insert(*k))
        .collect()
}
