//! Property-based test generators using proptest.

use crate::fixtures::{device_status, with_id};
use chrono::NaiveDateTime;
use nssync_engine::Record;
use proptest::prelude::*;

/// Strategy for `created_at` strings within 2023-01-01, at whole minutes.
///
/// A small range keeps collisions between two generated batches likely.
pub fn same_day_timestamp_strategy() -> impl Strategy<Value = String> {
    (0u32..24, 0u32..60).prop_map(|(h, m)| format!("2023-01-01T{h:02}:{m:02}:00Z"))
}

/// Strategy for batches of device status documents dated 2023-01-01,
/// each carrying a distinct source identifier.
pub fn device_status_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((same_day_timestamp_strategy(), 0u32..=100), 0..=max_len).prop_map(
        |items| {
            items
                .into_iter()
                .enumerate()
                .map(|(i, (created_at, battery))| {
                    with_id(device_status(&created_at, battery), &format!("src{i:04}"))
                })
                .collect()
        },
    )
}

/// Strategy for a sync range start: any minute of 2023.
pub fn range_start_strategy() -> impl Strategy<Value = NaiveDateTime> {
    (0u64..365, 0u32..24, 0u32..60).prop_map(|(d, h, m)| {
        let midnight = NaiveDateTime::parse_from_str("2023-01-01 00:00:00", "%Y-%m-%d %H:%M:%S")
            .expect("valid literal");
        midnight
            .checked_add_days(chrono::Days::new(d))
            .and_then(|t| t.checked_add_signed(chrono::TimeDelta::minutes(i64::from(h * 60 + m))))
            .expect("in range")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn batches_have_unique_ids(batch in device_status_batch_strategy(20)) {
            let mut ids: Vec<_> = batch.iter().map(|r| r["_id"].to_string()).collect();
            ids.sort();
            ids.dedup();
            prop_assert_eq!(ids.len(), batch.len());
        }

        #[test]
        fn timestamps_are_on_the_day(ts in same_day_timestamp_strategy()) {
            prop_assert!(ts.starts_with("2023-01-01T"));
        }
    }
}
