//! When the sweep fires.
//!
//! Schedules use the descriptor syntax common to cron libraries: `@every 90m`, `@hourly`,
//! `@daily` (or `@midnight`), and `@weekly`. All fire times are computed in UTC.

// crates.io
use time::{Time, UtcOffset};
// self
use crate::{_prelude::*, error::ConfigError};

/// Produces the fire times of a recurring job.
pub trait Schedule
where
	Self: Send + Sync,
{
	/// First fire time strictly after `now`, or `None` when the schedule is exhausted.
	fn next_after(&self, now: OffsetDateTime) -> Option<OffsetDateTime>;
}

/// Fixed-interval and calendar-aligned schedules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntervalSchedule {
	/// Fixed interval after the time the schedule is asked.
	Every(Duration),
	/// Top of every hour.
	Hourly,
	/// Midnight UTC every day.
	Daily,
	/// Midnight UTC every Sunday.
	Weekly,
}
impl Schedule for IntervalSchedule {
	fn next_after(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		let now = now.to_offset(UtcOffset::UTC);

		match self {
			Self::Every(interval) => now.checked_add(*interval),
			Self::Hourly => {
				let top = now.replace_time(Time::from_hms(now.hour(), 0, 0).ok()?);

				top.checked_add(Duration::HOUR)
			},
			Self::Daily => now.replace_time(Time::MIDNIGHT).checked_add(Duration::DAY),
			Self::Weekly => {
				let days = 7 - i64::from(now.weekday().number_days_from_sunday());

				now.replace_time(Time::MIDNIGHT).checked_add(Duration::days(days))
			},
		}
	}
}
impl FromStr for IntervalSchedule {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let expression = s.trim();
		let invalid = |reason| ConfigError::InvalidSchedule { expression: s.to_owned(), reason };

		match expression {
			"@hourly" => Ok(Self::Hourly),
			"@daily" | "@midnight" => Ok(Self::Daily),
			"@weekly" => Ok(Self::Weekly),
			_ => {
				let interval_body = expression
					.strip_prefix("@every")
					.ok_or_else(|| invalid("expected @every, @hourly, @daily, @midnight or @weekly"))?
					.trim();
				let interval = parse_interval(interval_body).ok_or_else(|| {
					invalid("interval must be a positive integer followed by s, m or h")
				})?;

				Ok(Self::Every(interval))
			},
		}
	}
}

fn parse_interval(body: &str) -> Option<Duration> {
	let unit = body.chars().last()?;
	let amount = body[..body.len() - unit.len_utf8()].parse::<i64>().ok().filter(|n| *n > 0)?;

	match unit {
		's' => Some(Duration::seconds(amount)),
		'm' => amount.checked_mul(60).map(Duration::seconds),
		'h' => amount.checked_mul(3_600).map(Duration::seconds),
		_ => None,
	}
}
