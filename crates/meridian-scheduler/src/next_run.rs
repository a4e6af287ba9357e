//! Computing a [`Schedule`]'s next fire time (spec §4.H2): TZ-aware,
//! DST-safe, and never backfilling missed ticks — only the next future
//! instant is ever returned.

use crate::error::{SchedulerError, SchedulerResult};
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use meridian_core::Schedule;
use std::str::FromStr;

/// Compute the next instant strictly after `after` that `schedule` fires
/// at, or `None` if the schedule has no future occurrence (an elapsed
/// one-shot `At`).
pub fn next_fire_after(schedule: &Schedule, after: DateTime<Utc>) -> SchedulerResult<Option<DateTime<Utc>>> {
    match schedule {
        Schedule::At { timestamp } => Ok((*timestamp > after).then_some(*timestamp)),
        Schedule::Every { period_s, anchor } => {
            if *period_s == 0 {
                return Ok(None);
            }
            let period = chrono::Duration::seconds(*period_s as i64);
            let mut next = anchor.unwrap_or(after);
            while next <= after {
                next += period;
            }
            Ok(Some(next))
        }
        Schedule::Cron { expr, tz } => next_cron_fire(expr, tz.as_deref(), after),
    }
}

fn next_cron_fire(expr: &str, tz: Option<&str>, after: DateTime<Utc>) -> SchedulerResult<Option<DateTime<Utc>>> {
    let parsed = CronSchedule::from_str(expr).map_err(|e| SchedulerError::InvalidCron {
        expr: expr.to_string(),
        detail: e.to_string(),
    })?;

    match tz {
        None => Ok(parsed.after(&after).next()),
        Some(name) => {
            let zone = chrono_tz::Tz::from_str(name).map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))?;
            let local_after = after.with_timezone(&zone);
            Ok(parsed.after(&local_after).next().map(|dt| dt.with_timezone(&Utc)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn at_fires_once_then_never_again() {
        let now = Utc::now();
        let future = now + chrono::Duration::seconds(60);
        let schedule = Schedule::At { timestamp: future };
        assert_eq!(next_fire_after(&schedule, now).unwrap(), Some(future));
        assert_eq!(next_fire_after(&schedule, future).unwrap(), None);
    }

    #[test]
    fn every_advances_by_whole_periods_past_a_downtime_gap() {
        let anchor = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let schedule = Schedule::Every {
            period_s: 60,
            anchor: Some(anchor),
        };
        // Simulate the scheduler having been down for five minutes: the
        // next fire must be the next future tick, not a backlog of five.
        let after = anchor + chrono::Duration::seconds(330);
        let next = next_fire_after(&schedule, after).unwrap().unwrap();
        assert_eq!(next, anchor + chrono::Duration::seconds(360));
    }

    #[test]
    fn cron_without_timezone_uses_utc() {
        let schedule = Schedule::Cron {
            expr: "0 0 * * * *".to_string(),
            tz: None,
        };
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 30, 0).unwrap();
        let next = next_fire_after(&schedule, now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 1, 13, 0, 0).unwrap());
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let schedule = Schedule::Cron {
            expr: "0 0 * * * *".to_string(),
            tz: Some("Not/AZone".to_string()),
        };
        let err = next_fire_after(&schedule, Utc::now()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidTimezone(_)));
    }
}
