// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cron trigger computation.
//!
//! Expressions use the 6/7-field form `sec min hour dom month dow [year]`
//! with `?` permitted for the mutually exclusive day fields.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Failures while compiling a trigger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriggerError {
    /// The cron expression does not parse.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron {
        /// The offending expression.
        expression: String,
        /// Parser detail.
        reason: String,
    },
}

/// Compile a cron expression into a schedule.
pub fn compile(expression: &str) -> Result<Schedule, TriggerError> {
    Schedule::from_str(expression.trim()).map_err(|e| TriggerError::InvalidCron {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

/// The next fire strictly after `after`, or `None` for exhausted schedules.
#[must_use]
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn reference_expressions_all_compile() {
        for expression in [
            "0 0 2 * * ?",
            "0 */15 * * * ?",
            "0 0 6 ? * MON-FRI",
            "0 0 0 1 * ?",
            "0/5 * * * * ?",
        ] {
            compile(expression).unwrap_or_else(|e| panic!("{expression}: {e}"));
        }
    }

    #[test]
    fn garbage_expressions_are_rejected() {
        assert!(compile("not cron").is_err());
        assert!(compile("").is_err());
    }

    #[test]
    fn next_fire_is_strictly_after_the_reference_instant() {
        let schedule = compile("0 0 2 * * ?").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 2, 0, 0).unwrap();
        let next = next_fire(&schedule, now).unwrap();
        assert!(next > now);
        assert_eq!((next.hour(), next.minute(), next.second()), (2, 0, 0));
        assert_eq!(next.day(), 16);
    }

    #[test]
    fn weekday_gate_skips_weekends() {
        let schedule = compile("0 0 6 ? * MON-FRI").unwrap();
        // 2024-01-13 is a Saturday.
        let saturday = Utc.with_ymd_and_hms(2024, 1, 13, 0, 0, 0).unwrap();
        let next = next_fire(&schedule, saturday).unwrap();
        assert_eq!(next.day(), 15, "fires Monday the 15th");
        assert_eq!(next.hour(), 6);
    }

    #[test]
    fn step_expression_fires_every_five_seconds() {
        let schedule = compile("0/5 * * * * ?").unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 1).unwrap();
        let next = next_fire(&schedule, now).unwrap();
        assert_eq!(next.second(), 5);
    }
}
