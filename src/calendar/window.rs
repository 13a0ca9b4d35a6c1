//! The span of time kept warm in the cache.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};

/// Window refreshed on every calendar notification: from the start of the
/// current UTC day to the last millisecond of next month.
///
/// Truncating the start to the day keeps the cache key stable for every
/// notification received on the same day.
pub fn availability_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let date_from = today.and_time(NaiveTime::MIN).and_utc();

    let month_start = today.with_day(1).unwrap_or(today);
    let month_after_next = month_start
        .checked_add_months(Months::new(2))
        .unwrap_or(NaiveDate::MAX);
    let date_to =
        month_after_next.and_time(NaiveTime::MIN).and_utc() - chrono::Duration::milliseconds(1);

    (date_from, date_to)
}
