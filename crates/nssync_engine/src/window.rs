//! Day-by-day paging over a sync range.
//!
//! Nightscout's query interface is unreliable over wide ranges, so a run
//! walks its range one calendar day at a time. Each step queries the
//! inclusive date pair `[from, to]`.

use chrono::{Days, NaiveDate, NaiveDateTime};

/// One step of a sync run: every record dated `from` through `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    /// First calendar day, inclusive.
    pub from: NaiveDate,
    /// Last calendar day, inclusive.
    pub to: NaiveDate,
}

/// Iterator over the day windows between `start` and `end`.
///
/// Each step takes the date of the cursor as `from`, advances the cursor
/// by one day, and takes the date of `min(cursor, end)` as `to`. When the
/// window collapses onto the end date itself (`from == to == end`), the
/// range is exhausted and iteration stops without yielding it.
#[derive(Debug, Clone)]
pub struct DayWindows {
    current: NaiveDateTime,
    end: NaiveDateTime,
    done: bool,
}

impl DayWindows {
    /// Creates the windows covering `[start, end)`.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            current: start,
            end,
            done: false,
        }
    }
}

impl Iterator for DayWindows {
    type Item = DayWindow;

    fn next(&mut self) -> Option<DayWindow> {
        if self.done || self.current >= self.end {
            return None;
        }

        let from = self.current.date();
        let Some(next) = self.current.checked_add_days(Days::new(1)) else {
            self.done = true;
            return None;
        };
        self.current = next;
        let to = self.current.min(self.end).date();

        let end_date = self.end.date();
        if from == to && from == end_date {
            self.done = true;
            return None;
        }

        Some(DayWindow { from, to })
    }
}

/// Returns the `(start, end)` pair of a run anchored at `now`.
///
/// The end reaches into the future so that "today" is covered whatever
/// timezone the servers stamp records in.
pub fn default_range(
    now: NaiveDateTime,
    days_back: u64,
    days_forward: u64,
) -> (NaiveDateTime, NaiveDateTime) {
    let start = now.checked_sub_days(Days::new(days_back)).unwrap_or(now);
    let end = now.checked_add_days(Days::new(days_forward)).unwrap_or(now);
    (start, end)
}
