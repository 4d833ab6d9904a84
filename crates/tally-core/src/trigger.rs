//! Daily wall-clock trigger for the due-rule sweep.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};

use crate::{Clock, RecurrenceProcessor};

const MAX_NAP: StdDuration = StdDuration::from_secs(1);

/// Fires [`RecurrenceProcessor::process_due_rules`] once a day at `run_at`
/// local time, where local time is `offset` from UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    run_at: NaiveTime,
    offset: FixedOffset,
}

impl DailyTrigger {
    pub fn new(run_at: NaiveTime, offset: FixedOffset) -> Self {
        Self { run_at, offset }
    }

    pub fn run_at(&self) -> NaiveTime {
        self.run_at
    }

    /// First instant strictly after `now` at which the local clock reads `run_at`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = now.with_timezone(&self.offset).naive_local();
        let mut candidate = local.date().and_time(self.run_at);
        if candidate <= local {
            candidate += Duration::days(1);
        }
        let utc = candidate - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        utc.and_utc()
    }

    /// Runs until `stop` is set and returns the number of sweeps performed.
    ///
    /// With `catch_up_on_start` a catch-up sweep runs immediately, so rules
    /// missed while the process was down fire before the first scheduled tick.
    /// Sweep errors are logged and the loop keeps going.
    pub fn run(
        &self,
        processor: &RecurrenceProcessor,
        clock: &dyn Clock,
        catch_up_on_start: bool,
        stop: &AtomicBool,
    ) -> usize {
        let mut sweeps = 0;
        if catch_up_on_start {
            sweep(processor, true);
            sweeps += 1;
        }

        while !stop.load(Ordering::SeqCst) {
            let next = self.next_fire_after(clock.now());
            tracing::info!(next_fire = %next, "waiting for next daily sweep");
            if !wait_until(clock, next, stop) {
                break;
            }
            sweep(processor, false);
            sweeps += 1;
        }
        tracing::info!(sweeps, "daily trigger stopped");
        sweeps
    }
}

/// Naps in short slices so `stop` is honoured promptly. Returns `false` when stopped.
fn wait_until(clock: &dyn Clock, deadline: DateTime<Utc>, stop: &AtomicBool) -> bool {
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline - clock.now();
        if remaining <= Duration::zero() {
            return true;
        }
        let nap = remaining.to_std().map_or(MAX_NAP, |left| left.min(MAX_NAP));
        thread::sleep(nap);
    }
}

fn sweep(processor: &RecurrenceProcessor, catch_up: bool) {
    if let Err(err) = processor.process_due_rules(catch_up) {
        tracing::error!(error = %err, catch_up, "due rule sweep aborted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixedClock, MemoryStorage, Repository};
    use chrono::{NaiveDate, TimeZone};
    use std::sync::Arc;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn fires_later_the_same_day() {
        let trigger = DailyTrigger::new(at(6, 0), FixedOffset::east_opt(0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 3, 30, 0).unwrap();
        assert_eq!(
            trigger.next_fire_after(now),
            Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn exact_run_time_moves_to_tomorrow() {
        let trigger = DailyTrigger::new(at(6, 0), FixedOffset::east_opt(0).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        assert_eq!(
            trigger.next_fire_after(now),
            Utc.with_ymd_and_hms(2024, 5, 2, 6, 0, 0).unwrap()
        );
    }

    #[test]
    fn honours_negative_offsets() {
        // 02:00 UTC on May 1 is 23:00 on April 30 at UTC-3.
        let trigger = DailyTrigger::new(at(0, 5), FixedOffset::west_opt(3 * 3600).unwrap());
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
        assert_eq!(
            trigger.next_fire_after(now),
            Utc.with_ymd_and_hms(2024, 5, 1, 3, 5, 0).unwrap()
        );
    }

    #[test]
    fn honours_positive_offsets_across_midnight() {
        // 23:30 UTC on Dec 31 is 08:30 on Jan 1 at UTC+9.
        let trigger = DailyTrigger::new(at(8, 0), FixedOffset::east_opt(9 * 3600).unwrap());
        let now = Utc.with_ymd_and_hms(2023, 12, 31, 23, 30, 0).unwrap();
        assert_eq!(
            trigger.next_fire_after(now),
            Utc.with_ymd_and_hms(2024, 1, 1, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn stopped_trigger_only_runs_startup_sweep() {
        let repository = Arc::new(Repository::open(Box::new(MemoryStorage::new())).unwrap());
        let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()));
        let processor = RecurrenceProcessor::new(repository, clock.clone());
        let trigger = DailyTrigger::new(at(6, 0), FixedOffset::east_opt(0).unwrap());
        let stop = AtomicBool::new(true);

        assert_eq!(trigger.run(&processor, clock.as_ref(), true, &stop), 1);
        assert_eq!(trigger.run(&processor, clock.as_ref(), false, &stop), 0);
    }

    #[test]
    fn due_deadline_does_not_sleep() {
        let clock = FixedClock::on(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        let stop = AtomicBool::new(false);
        assert!(wait_until(&clock, clock.now(), &stop));
    }
}
