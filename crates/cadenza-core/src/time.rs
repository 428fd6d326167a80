// Copyright (C) 2025 The Cadenza Authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Time source and calendar period arithmetic.
//!
//! All timestamps are stored in UTC. Period boundaries (start of day, week or
//! month) are computed in the local zone described by
//! [`TimeProvider::local_offset`] and converted back to UTC, so goals created at
//! different times of the same day share the same period start.

use std::sync::Mutex;

use chrono::{
    DateTime, Datelike, FixedOffset, Months, NaiveDate, NaiveDateTime, Offset, TimeDelta,
    TimeZone, Utc,
};

use crate::models::GoalPeriodUnit;

/// Source of "now" and of local period boundaries.
pub trait TimeProvider: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the local zone period boundaries are computed in.
    fn local_offset(&self) -> FixedOffset;

    /// Local midnight of the day containing `reference`, shifted by `offset` days.
    fn start_of_day(&self, offset: i64, reference: DateTime<Utc>) -> DateTime<Utc> {
        let zone = self.local_offset();
        let date = local_date(reference, zone) + TimeDelta::days(offset);
        midnight_to_utc(date, zone)
    }

    /// Local midnight of the Monday starting the week containing `reference`,
    /// shifted by `offset` weeks.
    fn start_of_week(&self, offset: i64, reference: DateTime<Utc>) -> DateTime<Utc> {
        let zone = self.local_offset();
        let date = local_date(reference, zone);
        let monday = date - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()));
        midnight_to_utc(monday + TimeDelta::weeks(offset), zone)
    }

    /// Local midnight of the first day of the month containing `reference`,
    /// shifted by `offset` months.
    fn start_of_month(&self, offset: i64, reference: DateTime<Utc>) -> DateTime<Utc> {
        let zone = self.local_offset();
        let date = local_date(reference, zone);
        let first = date.with_day(1).unwrap_or(date);
        midnight_to_utc(shift_months(first, offset), zone)
    }

    /// Beginning of the `unit` period containing `reference`.
    fn start_of_period(&self, unit: GoalPeriodUnit, reference: DateTime<Utc>) -> DateTime<Utc> {
        match unit {
            GoalPeriodUnit::Day => self.start_of_day(0, reference),
            GoalPeriodUnit::Week => self.start_of_week(0, reference),
            GoalPeriodUnit::Month => self.start_of_month(0, reference),
        }
    }
}

/// Wall-clock time source.
#[derive(Debug, Clone)]
pub struct SystemTimeProvider {
    offset: FixedOffset,
}

impl SystemTimeProvider {
    /// Use an explicit local offset.
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Use the host's current local offset.
    pub fn local() -> Self {
        Self::new(chrono::Local::now().offset().fix())
    }
}

impl Default for SystemTimeProvider {
    fn default() -> Self {
        Self::local()
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Deterministic clock that only moves when told to.
#[derive(Debug)]
pub struct FakeTimeProvider {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FakeTimeProvider {
    /// A clock frozen at `now` in UTC.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    /// A clock frozen at `now` whose local zone is `offset`.
    pub fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Jump to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Move the clock forward (or backward for negative deltas).
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += delta;
    }
}

impl TimeProvider for FakeTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn local_offset(&self) -> FixedOffset {
        self.offset
    }
}

impl GoalPeriodUnit {
    /// `start` moved forward by `count` units of calendar time in the local zone.
    ///
    /// The result is re-anchored to local wall-clock time, so month lengths are
    /// honoured and no drift accumulates across renewals. Returns `None` when
    /// the result falls outside the representable date range.
    pub fn advance(
        self,
        start: DateTime<Utc>,
        count: i32,
        offset: FixedOffset,
    ) -> Option<DateTime<Utc>> {
        let local = start.with_timezone(&offset).naive_local();
        let advanced = match self {
            Self::Day => local.checked_add_signed(TimeDelta::try_days(i64::from(count))?)?,
            Self::Week => local.checked_add_signed(TimeDelta::try_weeks(i64::from(count))?)?,
            Self::Month => {
                let months = Months::new(count.unsigned_abs());
                if count >= 0 {
                    local.checked_add_months(months)?
                } else {
                    local.checked_sub_months(months)?
                }
            }
        };
        let utc = advanced
            .checked_sub_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))?;
        Some(Utc.from_utc_datetime(&utc))
    }
}

fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

fn midnight_to_utc(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    local_to_utc(date.and_time(chrono::NaiveTime::MIN), offset)
}

/// Interpret a naive local wall-clock time in a fixed offset.
fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    Utc.from_utc_datetime(&(local - TimeDelta::seconds(i64::from(offset.local_minus_utc()))))
}

fn shift_months(date: NaiveDate, months: i64) -> NaiveDate {
    let magnitude = Months::new(months.unsigned_abs().min(u64::from(u32::MAX)) as u32);
    let shifted = if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    };
    shifted.unwrap_or(if months >= 0 {
        NaiveDate::MAX
    } else {
        NaiveDate::MIN
    })
}
