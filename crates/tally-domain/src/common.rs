//! Shared traits and calendar helpers.

use chrono::{Datelike, Duration, NaiveDate};
use uuid::Uuid;

/// Exposes a stable identifier for entities stored in the book.
pub trait Identifiable {
    fn id(&self) -> Uuid;
}

/// Associates entities with the user that owns them.
pub trait Owned {
    fn user_id(&self) -> Uuid;
}

/// Converts an entity into a user-facing display label.
pub trait Displayable {
    fn display_label(&self) -> String;
}

/// Number of days in `month` of `year`.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .map(|first_next| (first_next - Duration::days(1)).day())
        .unwrap_or(28)
}

/// Builds a date in the given month, pulling `day` back to the month's last day
/// when the month is shorter.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Shifts `date` by `months`, targeting `day` in the resulting month (clamped).
pub fn shift_month_to_day(date: NaiveDate, months: i32, day: u32) -> Option<NaiveDate> {
    let index = date.year() * 12 + date.month0() as i32 + months;
    let year = index.div_euclid(12);
    let month = index.rem_euclid(12) as u32 + 1;
    clamped_date(year, month, day)
}
