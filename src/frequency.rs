//! Calendar bins for cumulative ledger series.
//!
//! A [`Frequency`] maps every calendar date onto exactly one bin and names
//! that bin by its closing day:
//!
//! - `Month` and `Quarter` bins follow the calendar; the label is the last
//!   day of the month or of the quarter (Mar 31, Jun 30, Sep 30, Dec 31).
//! - N-day bins are contiguous, non-overlapping windows counted forward from
//!   1970-01-01: bin `k` covers `[epoch + k*N, epoch + (k+1)*N)` and is
//!   labeled `epoch + (k+1)*N - 1`. Every partition therefore shares the
//!   same bin boundaries, whatever its first observed date.
//! - `bin_end` is monotonic: a later date never maps to an earlier bin.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::error::PlannerError;

/// `NaiveDate::num_days_from_ce()` of 1970-01-01.
pub(crate) const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Supported aggregation frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Frequency {
    SevenDays,
    FourteenDays,
    TwentyEightDays,
    #[default]
    Month,
    Quarter,
}

impl Frequency {
    pub const ALL: [Frequency; 5] = [
        Frequency::SevenDays,
        Frequency::FourteenDays,
        Frequency::TwentyEightDays,
        Frequency::Month,
        Frequency::Quarter,
    ];

    /// Canonical selector token.
    pub fn token(&self) -> &'static str {
        match self {
            Frequency::SevenDays => "7D",
            Frequency::FourteenDays => "14D",
            Frequency::TwentyEightDays => "28D",
            Frequency::Month => "M",
            Frequency::Quarter => "Q",
        }
    }

    fn bin_len_days(&self) -> Option<i32> {
        match self {
            Frequency::SevenDays => Some(7),
            Frequency::FourteenDays => Some(14),
            Frequency::TwentyEightDays => Some(28),
            Frequency::Month | Frequency::Quarter => None,
        }
    }

    /// Closing day of the bin containing `date`.
    ///
    /// Returns `None` only when the closing day falls outside chrono's
    /// representable range.
    pub fn bin_end(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self.bin_len_days() {
            Some(len) => {
                let days = date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE;
                // Euclidean division keeps pre-epoch dates in the right bin.
                let bucket = days.div_euclid(len);
                let end = bucket * len + (len - 1);
                NaiveDate::from_num_days_from_ce_opt(end + UNIX_EPOCH_DAYS_FROM_CE)
            }
            None if *self == Frequency::Month => last_day_of_month(date.year(), date.month()),
            None => {
                let quarter_end_month = (date.month0() / 3) * 3 + 3;
                last_day_of_month(date.year(), quarter_end_month)
            }
        }
    }

    /// Closing day of the bin that follows the bin closing on `bin_end`.
    pub fn next_bin_end(&self, bin_end: NaiveDate) -> Option<NaiveDate> {
        self.bin_end(bin_end.succ_opt()?)
    }

    /// Every bin end from the bin of `first` through the bin of `last`,
    /// ascending and gap-free. Empty if `last < first`.
    pub fn bin_ends(&self, first: NaiveDate, last: NaiveDate) -> Option<Vec<NaiveDate>> {
        if last < first {
            return Some(Vec::new());
        }
        let stop = self.bin_end(last)?;
        let mut current = self.bin_end(first)?;
        let mut ends = vec![current];
        while current < stop {
            current = self.next_bin_end(current)?;
            ends.push(current);
        }
        Some(ends)
    }

    /// True when every bin of `self` lies entirely inside one bin of
    /// `coarser`, so a series at `self` can be re-binned exactly.
    pub fn nests_within(&self, coarser: Frequency) -> bool {
        match (self.bin_len_days(), coarser.bin_len_days()) {
            (Some(fine), Some(coarse)) => coarse % fine == 0,
            (None, None) => *self == coarser || coarser == Frequency::Quarter,
            // Day windows straddle month boundaries, and the reverse is
            // never exact either.
            _ => false,
        }
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Frequency {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Frequency::ALL
            .into_iter()
            .find(|freq| freq.token().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                let accepted: Vec<&str> = Frequency::ALL.iter().map(|f| f.token()).collect();
                PlannerError::Config(format!(
                    "unsupported frequency '{s}'; expected one of {}",
                    accepted.join(", ")
                ))
            })
    }
}
