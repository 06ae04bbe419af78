//! When the billing scheduler fires.

use chrono::{Duration, TimeZone, Utc};

use crate::config::{Cadence, SchedulerConfig};
use crate::domain::foundation::Timestamp;

const MINUTE_MILLIS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSchedule {
    /// Once a day at the given UTC hour.
    Daily { hour_utc: u32 },
    /// At the start of every minute.
    EveryMinute,
}

impl TickSchedule {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        match config.cadence {
            Cadence::Production => TickSchedule::Daily {
                hour_utc: config.daily_run_hour_utc,
            },
            Cadence::Accelerated => TickSchedule::EveryMinute,
        }
    }

    /// First tick strictly after `now`.
    pub fn next_after(&self, now: Timestamp) -> Timestamp {
        match *self {
            TickSchedule::EveryMinute => {
                let next = (now.epoch_millis().div_euclid(MINUTE_MILLIS) + 1) * MINUTE_MILLIS;
                Timestamp::from_epoch_millis(next).unwrap_or_else(|| now.plus(Duration::minutes(1)))
            }
            TickSchedule::Daily { hour_utc } => {
                let today = now
                    .as_datetime()
                    .date_naive()
                    .and_hms_opt(hour_utc.min(23), 0, 0)
                    .map(|naive| Timestamp::from_datetime(Utc.from_utc_datetime(&naive)));
                match today {
                    Some(at) if at > now => at,
                    Some(at) => at.plus_days(1),
                    None => now.plus_days(1),
                }
            }
        }
    }
}
