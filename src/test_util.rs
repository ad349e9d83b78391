//! Test-only ledger fixtures shared across module tests.

use polars::prelude::*;

/// Build a four-column ledger frame with string dates, i64 deltas and two
/// string category columns, in that order.
pub(crate) fn ledger(rows: &[(&str, i64, &str, &str)]) -> DataFrame {
    let dates: Vec<&str> = rows.iter().map(|r| r.0).collect();
    let deltas: Vec<i64> = rows.iter().map(|r| r.1).collect();
    let colours: Vec<&str> = rows.iter().map(|r| r.2).collect();
    let kinds: Vec<&str> = rows.iter().map(|r| r.3).collect();

    DataFrame::new(vec![
        Column::new("Date".into(), &dates),
        Column::new("Delta".into(), &deltas),
        Column::new("Colour".into(), &colours),
        Column::new("Kind".into(), &kinds),
    ])
    .unwrap()
}

/// The red/green jellybeans-and-frogs ledger used across the docs.
pub(crate) fn jellybean_ledger() -> DataFrame {
    ledger(&[
        ("2017-01-01", 10, "Red", "Jellybeans"),
        ("2017-01-01", 20, "Green", "Jellybeans"),
        ("2017-01-01", 25, "Green", "Frogs"),
        ("2017-01-01", 15, "Red", "Frogs"),
        ("2017-02-01", -10, "Red", "Frogs"),
    ])
}
