//! Next-fire-date computation for recurring rules.
//!
//! Everything here is pure: the caller supplies `today`, so identical inputs
//! always produce identical dates.

use chrono::{Datelike, Duration, NaiveDate};

use tally_domain::{clamped_date, shift_month_to_day, Frequency, RecurringRule};

use crate::CoreError;

/// Computes the next date a rule fires.
pub struct RecurrenceCalculator;

impl RecurrenceCalculator {
    /// Returns the next fire date for `rule` evaluated from `from`.
    ///
    /// On the first run the search starts at `max(from, today)`, so a start date
    /// that already matches the schedule fires on that day. Afterwards it starts
    /// the day after `from` (never before `today`), which keeps the result
    /// strictly after the occurrence that just fired.
    ///
    /// Days of month that do not exist in a candidate month are clamped to that
    /// month's last day (31 in April gives April 30).
    pub fn next_run_date(
        rule: &RecurringRule,
        from: NaiveDate,
        is_first_run: bool,
        today: NaiveDate,
    ) -> Result<NaiveDate, CoreError> {
        Self::validate_schedule(
            rule.frequency,
            rule.day_of_week,
            rule.day_of_month,
            rule.month_of_year,
        )?;
        let bound = search_start(from, is_first_run, today)?;
        let next = match rule.frequency {
            Frequency::Daily => bound,
            Frequency::Weekly => {
                let weekday = required(rule.day_of_week, rule.frequency, "day_of_week")?;
                next_weekday(bound, weekday)
            }
            Frequency::Monthly | Frequency::Biweekly => {
                let day = required(rule.day_of_month, rule.frequency, "day_of_month")?;
                next_monthly(bound, day)?
            }
            Frequency::Annual => {
                let month = required(rule.month_of_year, rule.frequency, "month_of_year")?;
                let day = required(rule.day_of_month, rule.frequency, "day_of_month")?;
                next_annual(bound, month, day)?
            }
        };
        Ok(next)
    }

    /// Checks that the parameters the frequency needs are present and in range.
    pub fn validate_schedule(
        frequency: Frequency,
        day_of_week: Option<u32>,
        day_of_month: Option<u32>,
        month_of_year: Option<u32>,
    ) -> Result<(), CoreError> {
        if let Some(day) = day_of_week {
            if day > 6 {
                return Err(CoreError::validation(format!(
                    "day_of_week must be between 0 and 6, got {day}"
                )));
            }
        }
        if let Some(day) = day_of_month {
            if !(1..=31).contains(&day) {
                return Err(CoreError::validation(format!(
                    "day_of_month must be between 1 and 31, got {day}"
                )));
            }
        }
        if let Some(month) = month_of_year {
            if !(1..=12).contains(&month) {
                return Err(CoreError::validation(format!(
                    "month_of_year must be between 1 and 12, got {month}"
                )));
            }
        }
        match frequency {
            Frequency::Daily => Ok(()),
            Frequency::Weekly => required(day_of_week, frequency, "day_of_week").map(|_| ()),
            Frequency::Monthly | Frequency::Biweekly => {
                required(day_of_month, frequency, "day_of_month").map(|_| ())
            }
            Frequency::Annual => {
                required(month_of_year, frequency, "month_of_year")?;
                required(day_of_month, frequency, "day_of_month").map(|_| ())
            }
        }
    }
}

fn required(value: Option<u32>, frequency: Frequency, field: &str) -> Result<u32, CoreError> {
    value.ok_or_else(|| {
        CoreError::validation(format!(
            "{} schedule requires {field}",
            frequency.to_string().to_lowercase()
        ))
    })
}

fn search_start(
    from: NaiveDate,
    is_first_run: bool,
    today: NaiveDate,
) -> Result<NaiveDate, CoreError> {
    let from = if is_first_run {
        from
    } else {
        from.succ_opt()
            .ok_or_else(|| CoreError::validation(format!("no date follows {from}")))?
    };
    Ok(from.max(today))
}

fn next_weekday(bound: NaiveDate, weekday: u32) -> NaiveDate {
    let current = bound.weekday().num_days_from_sunday();
    let ahead = (weekday + 7 - current) % 7;
    bound + Duration::days(ahead as i64)
}

fn next_monthly(bound: NaiveDate, day: u32) -> Result<NaiveDate, CoreError> {
    let candidate = clamped_date(bound.year(), bound.month(), day).ok_or_else(out_of_range)?;
    if candidate >= bound {
        return Ok(candidate);
    }
    shift_month_to_day(bound, 1, day).ok_or_else(out_of_range)
}

fn next_annual(bound: NaiveDate, month: u32, day: u32) -> Result<NaiveDate, CoreError> {
    let candidate = clamped_date(bound.year(), month, day).ok_or_else(out_of_range)?;
    if candidate >= bound {
        return Ok(candidate);
    }
    clamped_date(bound.year() + 1, month, day).ok_or_else(out_of_range)
}

fn out_of_range() -> CoreError {
    CoreError::validation("computed date is out of range")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tally_domain::EntryKind;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(frequency: Frequency) -> RecurringRule {
        RecurringRule {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            description: "Rent".into(),
            amount: dec!(900),
            currency: "ARS".into(),
            kind: EntryKind::Expense,
            frequency,
            day_of_week: None,
            day_of_month: None,
            month_of_year: None,
            start_date: date(2024, 1, 1),
            end_date: None,
            next_run_date: date(2024, 1, 1),
            last_run_date: None,
            is_active: true,
            account_id: Uuid::nil(),
            category_id: Uuid::nil(),
            notes: None,
            installment: None,
            created_at: Utc::now(),
        }
    }

    fn monthly(day: u32) -> RecurringRule {
        RecurringRule {
            day_of_month: Some(day),
            ..rule(Frequency::Monthly)
        }
    }

    #[test]
    fn monthly_first_run_then_steady_state() {
        let rent = monthly(15);
        let first =
            RecurrenceCalculator::next_run_date(&rent, date(2024, 1, 10), true, date(2024, 1, 10))
                .unwrap();
        assert_eq!(first, date(2024, 1, 15));

        let second = RecurrenceCalculator::next_run_date(&rent, first, false, first).unwrap();
        assert_eq!(second, date(2024, 2, 15));
    }

    #[test]
    fn monthly_clamps_to_last_day() {
        let rule = monthly(31);
        let april =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 4, 1), true, date(2024, 4, 1))
                .unwrap();
        assert_eq!(april, date(2024, 4, 30));

        let february =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 2, 1), true, date(2024, 2, 1))
                .unwrap();
        assert_eq!(february, date(2024, 2, 29));

        let after_january =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 1, 31), false, date(2024, 1, 31))
                .unwrap();
        assert_eq!(after_january, date(2024, 2, 29));
    }

    #[test]
    fn monthly_rolls_when_target_has_passed() {
        let rule = monthly(5);
        let next =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 1, 20), true, date(2024, 1, 20))
                .unwrap();
        assert_eq!(next, date(2024, 2, 5));

        let december =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 12, 5), false, date(2024, 12, 5))
                .unwrap();
        assert_eq!(december, date(2025, 1, 5));
    }

    #[test]
    fn biweekly_uses_day_of_month() {
        let rule = RecurringRule {
            day_of_month: Some(20),
            ..rule(Frequency::Biweekly)
        };
        let next =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 3, 21), true, date(2024, 3, 21))
                .unwrap();
        assert_eq!(next, date(2024, 4, 20));
    }

    #[test]
    fn daily_first_run_keeps_future_start() {
        let rule = rule(Frequency::Daily);
        let today = date(2024, 5, 1);
        assert_eq!(
            RecurrenceCalculator::next_run_date(&rule, date(2024, 5, 3), true, today).unwrap(),
            date(2024, 5, 3)
        );
        assert_eq!(
            RecurrenceCalculator::next_run_date(&rule, date(2024, 4, 20), true, today).unwrap(),
            today
        );
        assert_eq!(
            RecurrenceCalculator::next_run_date(&rule, today, false, today).unwrap(),
            date(2024, 5, 2)
        );
    }

    #[test]
    fn weekly_finds_matching_weekday() {
        // 2024-05-01 is a Wednesday; 1 = Monday.
        let rule = RecurringRule {
            day_of_week: Some(1),
            ..rule(Frequency::Weekly)
        };
        let today = date(2024, 5, 1);
        let next = RecurrenceCalculator::next_run_date(&rule, today, true, today).unwrap();
        assert_eq!(next, date(2024, 5, 6));
        let after = RecurrenceCalculator::next_run_date(&rule, next, false, next).unwrap();
        assert_eq!(after, date(2024, 5, 13));
    }

    #[test]
    fn weekly_first_run_on_matching_day_fires_same_day() {
        let rule = RecurringRule {
            day_of_week: Some(3),
            ..rule(Frequency::Weekly)
        };
        let today = date(2024, 5, 1);
        assert_eq!(
            RecurrenceCalculator::next_run_date(&rule, today, true, today).unwrap(),
            today
        );
    }

    #[test]
    fn annual_respects_month_and_leap_years() {
        let rule = RecurringRule {
            day_of_month: Some(29),
            month_of_year: Some(2),
            ..rule(Frequency::Annual)
        };
        let leap =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 1, 1), true, date(2024, 1, 1))
                .unwrap();
        assert_eq!(leap, date(2024, 2, 29));
        let following = RecurrenceCalculator::next_run_date(&rule, leap, false, leap).unwrap();
        assert_eq!(following, date(2025, 2, 28));
    }

    #[test]
    fn catch_up_never_schedules_before_today() {
        let rule = monthly(15);
        let next =
            RecurrenceCalculator::next_run_date(&rule, date(2024, 1, 15), false, date(2024, 3, 20))
                .unwrap();
        assert_eq!(next, date(2024, 4, 15));
    }

    #[test]
    fn computation_is_deterministic() {
        let rule = monthly(31);
        let from = date(2023, 11, 2);
        let a = RecurrenceCalculator::next_run_date(&rule, from, false, from);
        let b = RecurrenceCalculator::next_run_date(&rule, from, false, from);
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[test]
    fn missing_or_invalid_parameters_are_rejected() {
        let weekly = rule(Frequency::Weekly);
        let start = date(2024, 1, 1);
        let err = RecurrenceCalculator::next_run_date(&weekly, start, true, start)
            .expect_err("weekly needs a weekday");
        assert!(matches!(
            err,
            CoreError::Validation(ref msg) if msg.contains("day_of_week")
        ));

        let valid = |frequency, weekday, day, month| {
            RecurrenceCalculator::validate_schedule(frequency, weekday, day, month).is_ok()
        };
        assert!(!valid(Frequency::Weekly, Some(7), None, None));
        assert!(!valid(Frequency::Monthly, None, Some(0), None));
        assert!(!valid(Frequency::Annual, None, Some(3), None));
        assert!(!valid(Frequency::Annual, None, Some(3), Some(13)));
        assert!(valid(Frequency::Daily, None, None, None));
    }
}
