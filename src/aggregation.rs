use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;

use crate::error::PlannerError;
use crate::frequency::{Frequency, UNIX_EPOCH_DAYS_FROM_CE};
use crate::partition::PartitionMap;
use crate::schema::{series, LedgerLayout};

/// Accepted textual date layouts, tried in order.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One bin of a cumulative series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub bin_end: NaiveDate,
    pub value: f64,
}

/// Cumulative availability of one partition, one point per bin.
///
/// Points are sorted by `bin_end` and gap-free between the first and the
/// last bin holding ledger rows.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSeries {
    pub label: String,
    pub frequency: Frequency,
    pub points: Vec<SeriesPoint>,
}

impl AggregatedSeries {
    pub fn empty(label: &str, frequency: Frequency) -> Self {
        Self {
            label: label.to_string(),
            frequency,
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    /// Value of the bin closing on `bin_end`, if the series has that bin.
    pub fn value_at(&self, bin_end: NaiveDate) -> Option<f64> {
        self.points
            .binary_search_by_key(&bin_end, |p| p.bin_end)
            .ok()
            .map(|i| self.points[i].value)
    }

    /// Two-column frame: `bin_end` (Date) and `available` (Float64).
    pub fn to_dataframe(&self) -> Result<DataFrame, PlannerError> {
        let ends: Vec<NaiveDate> = self.points.iter().map(|p| p.bin_end).collect();
        let values: Vec<f64> = self.points.iter().map(|p| p.value).collect();
        let df = DataFrame::new(vec![
            Column::new(series::BIN_END.into(), ends),
            Column::new(series::AVAILABLE.into(), values),
        ])?;
        Ok(df)
    }

    /// Re-bin an already cumulative series at a coarser frequency.
    ///
    /// Each coarse bin takes the value of the last fine bin inside it, so the
    /// final cumulative value is unchanged. Only frequencies whose bins nest
    /// exactly are accepted.
    pub fn rebin(&self, coarser: Frequency) -> Result<AggregatedSeries, PlannerError> {
        if !self.frequency.nests_within(coarser) {
            return Err(PlannerError::Config(format!(
                "cannot re-bin a {} series at {}: bins do not nest",
                self.frequency, coarser
            )));
        }

        let mut last_in_bin: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        for point in &self.points {
            let end = coarser
                .bin_end(point.bin_end)
                .ok_or_else(|| out_of_range(point.bin_end))?;
            last_in_bin.insert(end, point.value);
        }

        let points = fill_bins(coarser, &last_in_bin, |v| *v)?;
        Ok(AggregatedSeries {
            label: self.label.clone(),
            frequency: coarser,
            points,
        })
    }
}

/// A partition whose table could not be aggregated.
#[derive(Debug)]
pub struct PartitionFailure {
    pub label: String,
    pub error: PlannerError,
}

/// Outcome of aggregating a whole partition map.
#[derive(Debug, Default)]
pub struct AggregationReport {
    pub series: BTreeMap<String, AggregatedSeries>,
    pub failures: Vec<PartitionFailure>,
}

impl AggregationReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Series with at least one bin.
    pub fn non_empty(&self) -> impl Iterator<Item = &AggregatedSeries> {
        self.series.values().filter(|s| !s.is_empty())
    }
}

/// Turns partition tables into cumulative series at one frequency.
pub struct Aggregator {
    layout: LedgerLayout,
    frequency: Frequency,
}

impl Aggregator {
    pub fn new(layout: LedgerLayout, frequency: Frequency) -> Self {
        Self { layout, frequency }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Aggregate every partition independently.
    ///
    /// A partition that fails to parse is recorded in the report and does
    /// not affect its siblings.
    pub fn aggregate(&self, partitions: &PartitionMap) -> AggregationReport {
        let mut report = AggregationReport::default();
        for (label, table) in partitions {
            match self.aggregate_table(label, table) {
                Ok(series) => {
                    log::debug!("partition '{}': {} bins", label, series.len());
                    report.series.insert(label.clone(), series);
                }
                Err(error) => {
                    log::warn!("partition '{}' skipped: {}", label, error);
                    report.failures.push(PartitionFailure {
                        label: label.clone(),
                        error,
                    });
                }
            }
        }
        report
    }

    /// Aggregate one partition table into a cumulative series.
    ///
    /// Every bin's value is the cumulative sum of deltas through that bin.
    /// A bin without rows, or whose rows carry no delta, inherits the
    /// preceding bin's value. An empty table yields an empty series.
    pub fn aggregate_table(
        &self,
        label: &str,
        df: &DataFrame,
    ) -> Result<AggregatedSeries, PlannerError> {
        if df.height() == 0 {
            return Ok(AggregatedSeries::empty(label, self.frequency));
        }

        let dates = positional_column(df, self.layout.date_column_index)?;
        let deltas = positional_column(df, self.layout.delta_column_index)?;

        let mut sums: BTreeMap<NaiveDate, Option<f64>> = BTreeMap::new();
        for row in 0..df.height() {
            let date = parse_date_value(&dates.get(row)?)
                .map_err(|reason| PlannerError::data_format(row, reason))?;
            let delta = parse_delta_value(&deltas.get(row)?)
                .map_err(|reason| PlannerError::data_format(row, reason))?;
            let bin = self
                .frequency
                .bin_end(date)
                .ok_or_else(|| PlannerError::data_format(row, format!("date {date} out of range")))?;

            let slot = sums.entry(bin).or_insert(None);
            if let Some(delta) = delta {
                *slot = Some(slot.unwrap_or(0.0) + delta);
            }
        }

        let mut cumulative = 0.0;
        let points = fill_bins(self.frequency, &sums, |sum| {
            if let Some(sum) = sum {
                cumulative += sum;
            }
            cumulative
        })?;

        Ok(AggregatedSeries {
            label: label.to_string(),
            frequency: self.frequency,
            points,
        })
    }
}

/// Walk every bin between the first and last key of `binned`, in order,
/// mapping each bin's entry (if any) to its output value. Bins without an
/// entry repeat the previous output value.
fn fill_bins<T>(
    frequency: Frequency,
    binned: &BTreeMap<NaiveDate, T>,
    mut value_of: impl FnMut(&T) -> f64,
) -> Result<Vec<SeriesPoint>, PlannerError> {
    let (Some(first), Some(last)) = (binned.keys().next(), binned.keys().next_back()) else {
        return Ok(Vec::new());
    };
    let ends = frequency
        .bin_ends(*first, *last)
        .ok_or_else(|| out_of_range(*last))?;

    let mut points = Vec::with_capacity(ends.len());
    let mut carried = 0.0;
    for bin_end in ends {
        if let Some(entry) = binned.get(&bin_end) {
            carried = value_of(entry);
        }
        points.push(SeriesPoint {
            bin_end,
            value: carried,
        });
    }
    Ok(points)
}

fn out_of_range(date: NaiveDate) -> PlannerError {
    PlannerError::Config(format!("bins after {date} are out of the supported date range"))
}

fn positional_column(df: &DataFrame, index: usize) -> Result<&Series, PlannerError> {
    df.get_columns()
        .get(index)
        .map(|c| c.as_materialized_series())
        .ok_or_else(|| PlannerError::MissingColumn(format!("column index {index}")))
}

fn parse_date_value(value: &AnyValue) -> Result<NaiveDate, String> {
    match value {
        AnyValue::Null => Err("missing date".to_string()),
        AnyValue::Date(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| format!("date value {days} out of range")),
        AnyValue::Datetime(v, unit, tz) => datetime_to_date(*v, *unit, tz.map(|t| t.as_str())),
        AnyValue::DatetimeOwned(v, unit, tz) => {
            datetime_to_date(*v, *unit, tz.as_deref().map(|t| t.as_str()))
        }
        AnyValue::String(s) => parse_date_str(s),
        AnyValue::StringOwned(s) => parse_date_str(s.as_str()),
        other => Err(format!("unsupported date value {other}")),
    }
}

/// Naive and UTC datetimes only; any other zone would shift the local
/// calendar day.
fn datetime_to_date(value: i64, unit: TimeUnit, tz: Option<&str>) -> Result<NaiveDate, String> {
    if let Some(tz) = tz.filter(|tz| !tz.eq_ignore_ascii_case("UTC")) {
        return Err(format!(
            "datetime in time zone '{tz}' is not supported, convert it to a naive local datetime"
        ));
    }
    let micros = match unit {
        TimeUnit::Nanoseconds => value.div_euclid(1_000),
        TimeUnit::Microseconds => value,
        TimeUnit::Milliseconds => value.saturating_mul(1_000),
    };
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.date_naive())
        .ok_or_else(|| format!("datetime value {value} out of range"))
}

fn parse_date_str(raw: &str) -> Result<NaiveDate, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("missing date".to_string());
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .ok_or_else(|| format!("unparseable date '{raw}'"))
}

/// `Ok(None)` is a missing delta, which contributes nothing to its bin.
fn parse_delta_value(value: &AnyValue) -> Result<Option<f64>, String> {
    match value {
        AnyValue::Null => Ok(None),
        AnyValue::String(s) => parse_delta_str(s),
        AnyValue::StringOwned(s) => parse_delta_str(s.as_str()),
        AnyValue::Int8(_)
        | AnyValue::Int16(_)
        | AnyValue::Int32(_)
        | AnyValue::Int64(_)
        | AnyValue::UInt8(_)
        | AnyValue::UInt16(_)
        | AnyValue::UInt32(_)
        | AnyValue::UInt64(_)
        | AnyValue::Float32(_)
        | AnyValue::Float64(_) => value
            .extract::<f64>()
            .map(finite_or_missing)
            .ok_or_else(|| format!("delta {value} is not representable as f64")),
        other => Err(format!("non-numeric delta {other}")),
    }
}

fn parse_delta_str(raw: &str) -> Result<Option<f64>, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(None);
    }
    s.parse::<f64>()
        .map(finite_or_missing)
        .map_err(|_| format!("non-numeric delta '{raw}'"))
}

/// NaN and infinities count as missing.
fn finite_or_missing(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::Partitioner;
    use crate::test_util::{jellybean_ledger, ledger};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn monthly() -> Aggregator {
        Aggregator::new(LedgerLayout::default(), Frequency::Month)
    }

    fn values(series: &AggregatedSeries) -> Vec<(NaiveDate, f64)> {
        series.points.iter().map(|p| (p.bin_end, p.value)).collect()
    }

    #[test]
    fn jellybean_scenario_monthly() {
        let partitions = Partitioner::new(LedgerLayout::default())
            .partition_sheets(&[crate::workbook::Sheet {
                name: "beans".into(),
                table: jellybean_ledger(),
            }])
            .unwrap();
        assert_eq!(partitions["Red-Frogs"].height(), 2);

        let report = monthly().aggregate(&partitions);
        assert!(report.is_complete());

        assert_eq!(
            values(&report.series["Red-Frogs"]),
            vec![(d(2017, 1, 31), 15.0), (d(2017, 2, 28), 5.0)]
        );
        assert_eq!(
            values(&report.series["Green-Jellybeans"]),
            vec![(d(2017, 1, 31), 20.0)]
        );
        assert_eq!(
            values(&report.series["Red-Jellybeans"]),
            vec![(d(2017, 1, 31), 10.0)]
        );
        assert_eq!(
            values(&report.series["Green-Frogs"]),
            vec![(d(2017, 1, 31), 25.0)]
        );
    }

    #[test]
    fn gap_bins_carry_previous_value() {
        let df = ledger(&[
            ("2017-01-10", 4, "Red", "Frogs"),
            ("2017-01-20", 3, "Red", "Frogs"),
            ("2017-05-02", -2, "Red", "Frogs"),
        ]);
        let series = monthly().aggregate_table("Red-Frogs", &df).unwrap();
        assert_eq!(
            values(&series),
            vec![
                (d(2017, 1, 31), 7.0),
                (d(2017, 2, 28), 7.0),
                (d(2017, 3, 31), 7.0),
                (d(2017, 4, 30), 7.0),
                (d(2017, 5, 31), 5.0),
            ]
        );
        for pair in series.points.windows(2) {
            assert!(pair[0].bin_end < pair[1].bin_end);
        }
    }

    #[test]
    fn rows_are_binned_regardless_of_input_order() {
        let df = ledger(&[
            ("2017-03-01", 1, "Red", "Frogs"),
            ("2017-01-01", 10, "Red", "Frogs"),
        ]);
        let series = monthly().aggregate_table("Red-Frogs", &df).unwrap();
        assert_eq!(
            values(&series),
            vec![(d(2017, 1, 31), 10.0), (d(2017, 2, 28), 10.0), (d(2017, 3, 31), 11.0)]
        );
    }

    #[test]
    fn seven_day_bins_are_labeled_by_closing_day() {
        // 2017-01-05 is day 17171 since the epoch, which opens a 7-day bin.
        let df = ledger(&[
            ("2017-01-05", 2, "Red", "Frogs"),
            ("2017-01-20", 3, "Red", "Frogs"),
        ]);
        let agg = Aggregator::new(LedgerLayout::default(), Frequency::SevenDays);
        let series = agg.aggregate_table("Red-Frogs", &df).unwrap();

        let first = Frequency::SevenDays.bin_end(d(2017, 1, 5)).unwrap();
        assert_eq!(series.points[0].bin_end, first);
        assert!(first >= d(2017, 1, 5));
        assert_eq!(first, d(2017, 1, 11));
        assert_eq!(series.last_value(), Some(5.0));
        for pair in series.points.windows(2) {
            assert_eq!((pair[1].bin_end - pair[0].bin_end).num_days(), 7);
        }
    }

    #[test]
    fn empty_partition_yields_empty_series() {
        let df = ledger(&[]);
        let series = monthly().aggregate_table("Blue-Frogs", &df).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.last_value(), None);
        assert_eq!(series.to_dataframe().unwrap().height(), 0);
    }

    #[test]
    fn bad_date_fails_only_its_partition() {
        let mut partitions = PartitionMap::new();
        partitions.insert(
            "Red-Frogs".into(),
            ledger(&[("not a date", 1, "Red", "Frogs")]),
        );
        partitions.insert(
            "Green-Frogs".into(),
            ledger(&[("2017-01-01", 3, "Green", "Frogs")]),
        );

        let report = monthly().aggregate(&partitions);
        assert_eq!(report.series.len(), 1);
        assert_eq!(report.series["Green-Frogs"].last_value(), Some(3.0));
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "Red-Frogs");
        assert!(matches!(
            report.failures[0].error,
            PlannerError::DataFormat { row: 0, .. }
        ));
    }

    #[test]
    fn non_numeric_delta_is_data_format_error() {
        let df = DataFrame::new(vec![
            Column::new("Date".into(), &["2017-01-01", "2017-01-02"]),
            Column::new("Delta".into(), &["5", "lots"]),
            Column::new("Colour".into(), &["Red", "Red"]),
            Column::new("Kind".into(), &["Frogs", "Frogs"]),
        ])
        .unwrap();
        let err = monthly().aggregate_table("Red-Frogs", &df).unwrap_err();
        match err {
            PlannerError::DataFormat { row, reason } => {
                assert_eq!(row, 1);
                assert!(reason.contains("lots"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn string_deltas_and_datetime_strings_are_coerced() {
        let df = DataFrame::new(vec![
            Column::new(
                "Date".into(),
                &["2017-01-03 09:30:00", "2017/02/01", " 2017-02-15 "],
            ),
            Column::new("Delta".into(), &[" +4 ", "2.5", "-1"]),
            Column::new("Colour".into(), &["Red", "Red", "Red"]),
            Column::new("Kind".into(), &["Frogs", "Frogs", "Frogs"]),
        ])
        .unwrap();
        let series = monthly().aggregate_table("Red-Frogs", &df).unwrap();
        assert_eq!(
            values(&series),
            vec![(d(2017, 1, 31), 4.0), (d(2017, 2, 28), 5.5)]
        );
    }

    #[test]
    fn missing_deltas_inherit_previous_value() {
        let df = DataFrame::new(vec![
            Column::new("Date".into(), &["2017-01-01", "2017-02-01", "2017-03-01"]),
            Column::new("Delta".into(), &[Some(8i64), None, Some(1)]),
            Column::new("Colour".into(), &["Red", "Red", "Red"]),
            Column::new("Kind".into(), &["Frogs", "Frogs", "Frogs"]),
        ])
        .unwrap();
        let series = monthly().aggregate_table("Red-Frogs", &df).unwrap();
        assert_eq!(
            values(&series),
            vec![(d(2017, 1, 31), 8.0), (d(2017, 2, 28), 8.0), (d(2017, 3, 31), 9.0)]
        );
    }

    #[test]
    fn not_a_number_deltas_inherit_previous_value() {
        let expected = vec![(d(2017, 1, 31), 8.0), (d(2017, 2, 28), 8.0), (d(2017, 3, 31), 9.0)];
        let dates = ["2017-01-01", "2017-02-01", "2017-03-01"];
        let colours = ["Red", "Red", "Red"];
        let kinds = ["Frogs", "Frogs", "Frogs"];

        let floats = DataFrame::new(vec![
            Column::new("Date".into(), &dates),
            Column::new("Delta".into(), &[8.0f64, f64::NAN, 1.0]),
            Column::new("Colour".into(), &colours),
            Column::new("Kind".into(), &kinds),
        ])
        .unwrap();
        let series = monthly().aggregate_table("Red-Frogs", &floats).unwrap();
        assert_eq!(values(&series), expected);

        let strings = DataFrame::new(vec![
            Column::new("Date".into(), &dates),
            Column::new("Delta".into(), &["8", "NaN", "1"]),
            Column::new("Colour".into(), &colours),
            Column::new("Kind".into(), &kinds),
        ])
        .unwrap();
        let series = monthly().aggregate_table("Red-Frogs", &strings).unwrap();
        assert_eq!(values(&series), expected);
        assert_eq!(parse_delta_str("inf"), Ok(None));
    }

    #[test]
    fn extreme_date_values_are_format_errors() {
        assert!(parse_date_value(&AnyValue::Date(i32::MAX)).is_err());
        assert!(parse_date_value(&AnyValue::Date(i32::MIN)).is_err());
        assert_eq!(parse_date_value(&AnyValue::Date(17167)), Ok(d(2017, 1, 1)));
    }

    #[test]
    fn zoned_datetimes_are_rejected_unless_utc() {
        // 2017-01-31T23:30:00Z
        let micros = 1_485_905_400_000_000;
        assert_eq!(
            datetime_to_date(micros, TimeUnit::Microseconds, None),
            Ok(d(2017, 1, 31))
        );
        assert_eq!(
            datetime_to_date(micros / 1_000, TimeUnit::Milliseconds, Some("UTC")),
            Ok(d(2017, 1, 31))
        );
        let err = datetime_to_date(micros, TimeUnit::Microseconds, Some("Europe/Oslo")).unwrap_err();
        assert!(err.contains("Europe/Oslo"));
    }

    #[test]
    fn native_date_column_is_accepted() {
        let dates = [d(2017, 1, 1), d(2017, 4, 1)];
        let df = DataFrame::new(vec![
            Column::new("Date".into(), dates.as_slice()),
            Column::new("Delta".into(), &[3.0f64, 4.0]),
            Column::new("Colour".into(), &["Red", "Red"]),
            Column::new("Kind".into(), &["Frogs", "Frogs"]),
        ])
        .unwrap();
        let agg = Aggregator::new(LedgerLayout::default(), Frequency::Quarter);
        let series = agg.aggregate_table("Red-Frogs", &df).unwrap();
        assert_eq!(
            values(&series),
            vec![(d(2017, 3, 31), 3.0), (d(2017, 6, 30), 7.0)]
        );
    }

    #[test]
    fn rebin_preserves_final_value() {
        let df = ledger(&[
            ("2017-01-01", 10, "Red", "Frogs"),
            ("2017-02-14", -3, "Red", "Frogs"),
            ("2017-05-09", 6, "Red", "Frogs"),
            ("2017-08-30", -1, "Red", "Frogs"),
        ]);
        let monthly_series = monthly().aggregate_table("Red-Frogs", &df).unwrap();
        let rebinned = monthly_series.rebin(Frequency::Quarter).unwrap();
        let quarterly = Aggregator::new(LedgerLayout::default(), Frequency::Quarter)
            .aggregate_table("Red-Frogs", &df)
            .unwrap();

        assert_eq!(rebinned.last_value(), monthly_series.last_value());
        assert_eq!(rebinned, quarterly);
        assert_eq!(rebinned.value_at(d(2017, 6, 30)), Some(13.0));
    }

    #[test]
    fn rebin_rejects_bins_that_do_not_nest() {
        let df = ledger(&[("2017-01-01", 1, "Red", "Frogs")]);
        let series = Aggregator::new(LedgerLayout::default(), Frequency::SevenDays)
            .aggregate_table("Red-Frogs", &df)
            .unwrap();
        assert!(matches!(
            series.rebin(Frequency::Month),
            Err(PlannerError::Config(_))
        ));
        assert!(series.rebin(Frequency::TwentyEightDays).is_ok());
    }

    #[test]
    fn to_dataframe_has_bin_end_and_available_columns() {
        let df = jellybean_ledger();
        let series = monthly().aggregate_table("All", &df).unwrap();
        let out = series.to_dataframe().unwrap();
        assert_eq!(out.get_column_names_str(), vec!["bin_end", "available"]);
        assert_eq!(out.height(), 2);
        let available: Vec<Option<f64>> =
            out.column("available").unwrap().f64().unwrap().into_iter().collect();
        assert_eq!(available, vec![Some(70.0), Some(60.0)]);
        assert_eq!(out.column("bin_end").unwrap().dtype(), &DataType::Date);
    }
}
