//! Cron/interval/one-time next-fire computation. New subsystem (the teacher
//! has no scheduler); grounded on the `cron` crate's `Schedule::after`
//! iterator, composed with `chrono-tz` so expressions evaluate in the
//! schedule's configured IANA timezone rather than UTC.

use std::str::FromStr;

use casare_application::NextFireCalculator;
use casare_core::{AppError, AppResult};
use casare_domain::ScheduleType;
use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;

/// Computes next-fire instants for `cron`, `interval`, and `one_time`
/// triggers. `event` and `dependency` triggers are not time-driven and
/// always report no next fire.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronNextFireCalculator;

impl CronNextFireCalculator {
    /// Creates a new calculator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn next_cron_fire(
        &self,
        expression: &str,
        timezone: &str,
        after: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let tz: chrono_tz::Tz = timezone
            .parse()
            .map_err(|_| AppError::Validation(format!("invalid IANA timezone '{timezone}'")))?;

        let schedule = CronSchedule::from_str(expression).map_err(|error| {
            AppError::Validation(format!("invalid cron expression '{expression}': {error}"))
        })?;

        let local_after = after.with_timezone(&tz);
        Ok(schedule.after(&local_after).next().map(|next| next.with_timezone(&Utc)))
    }
}

impl NextFireCalculator for CronNextFireCalculator {
    fn next_fire(
        &self,
        schedule_type: &ScheduleType,
        timezone: &str,
        after: DateTime<Utc>,
    ) -> AppResult<Option<DateTime<Utc>>> {
        match schedule_type {
            ScheduleType::Cron { expression } => self.next_cron_fire(expression, timezone, after),
            ScheduleType::Interval { period_seconds, reference_time } => {
                Ok(Some(next_interval_fire(*period_seconds, *reference_time, after)?))
            }
            ScheduleType::OneTime { at } => Ok((*at > after).then_some(*at)),
            ScheduleType::Event { .. } | ScheduleType::Dependency { .. } => Ok(None),
        }
    }
}

/// Returns the next instant strictly after `after` that is
/// `reference_time + n * period_seconds` for some `n >= 0`.
fn next_interval_fire(
    period_seconds: u64,
    reference_time: DateTime<Utc>,
    after: DateTime<Utc>,
) -> AppResult<DateTime<Utc>> {
    if period_seconds == 0 {
        return Err(AppError::Validation(
            "interval schedule period_seconds must be greater than zero".to_owned(),
        ));
    }

    let period_seconds = i64::try_from(period_seconds)
        .map_err(|error| AppError::Validation(format!("interval period_seconds overflow: {error}")))?;

    let elapsed_seconds = (after - reference_time).num_seconds();
    let elapsed_periods = if elapsed_seconds < 0 {
        0
    } else {
        elapsed_seconds / period_seconds + 1
    };

    Ok(reference_time + chrono::Duration::seconds(elapsed_periods * period_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cron_advances_to_next_matching_minute() {
        let calculator = CronNextFireCalculator::new();
        let after = Utc.with_ymd_and_hms(2026, 1, 1, 10, 30, 0).unwrap();
        let next = calculator
            .next_fire(
                &ScheduleType::Cron { expression: "0 0 * * * *".to_owned() },
                "UTC",
                after,
            )
            .expect("valid cron");
        assert_eq!(next, Some(Utc.with_ymd_and_hms(2026, 1, 1, 11, 0, 0).unwrap()));
    }

    #[test]
    fn cron_rejects_invalid_expression() {
        let calculator = CronNextFireCalculator::new();
        let result = calculator.next_fire(
            &ScheduleType::Cron { expression: "not a cron expression".to_owned() },
            "UTC",
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn interval_fires_on_the_period_after_reference() {
        let calculator = CronNextFireCalculator::new();
        let reference = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let after = reference + chrono::Duration::seconds(90);
        let next = calculator
            .next_fire(
                &ScheduleType::Interval { period_seconds: 60, reference_time: reference },
                "UTC",
                after,
            )
            .expect("valid interval");
        assert_eq!(next, Some(reference + chrono::Duration::seconds(120)));
    }

    #[test]
    fn one_time_fires_once_then_never_again() {
        let calculator = CronNextFireCalculator::new();
        let at = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        let before = calculator
            .next_fire(&ScheduleType::OneTime { at }, "UTC", at - chrono::Duration::seconds(1))
            .expect("valid one_time");
        assert_eq!(before, Some(at));

        let after = calculator
            .next_fire(&ScheduleType::OneTime { at }, "UTC", at)
            .expect("valid one_time");
        assert_eq!(after, None);
    }
}
