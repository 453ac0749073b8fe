// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron schedule matching for the global scheduler.
//!
//! DAGs declare standard 5-field crontab expressions (`min hour dom month
//! dow`). The `cron` crate operates on 6/7-field expressions with a
//! leading seconds field, so every expression is parsed with `"0 "`
//! prepended.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("invalid cron expression {expr:?}: {source}")]
    InvalidExpression { expr: String, source: cron::error::Error },
}

/// One parsed cron expression.
#[derive(Clone)]
pub struct CronExpr {
    raw: String,
    schedule: CronSchedule,
}

impl CronExpr {
    pub fn parse(expr: &str) -> Result<Self, CronError> {
        let six_field = format!("0 {expr}");
        let schedule = CronSchedule::from_str(&six_field)
            .map_err(|source| CronError::InvalidExpression { expr: expr.to_string(), source })?;
        Ok(Self { raw: expr.to_string(), schedule })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this schedule has an occurrence falling in the same minute
    /// as `now`. The scheduler polls on a sub-minute interval; calling this
    /// once per distinct minute is sufficient to never miss or double-fire
    /// a run.
    pub fn matches_minute<Tz: TimeZone>(&self, now: DateTime<Tz>) -> bool
    where
        Tz::Offset: std::fmt::Display,
    {
        let now = match now.with_second(0).and_then(|t| t.with_nanosecond(0)) {
            Some(t) => t,
            None => return false,
        };
        let one_minute_ago = now.clone() - chrono::Duration::minutes(1);
        self.schedule
            .after(&one_minute_ago)
            .take(2)
            .any(|occurrence| {
                occurrence.year() == now.year()
                    && occurrence.month() == now.month()
                    && occurrence.day() == now.day()
                    && occurrence.hour() == now.hour()
                    && occurrence.minute() == now.minute()
            })
    }

    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// A DAG's full set of cron expressions, evaluated as a logical OR: the
/// DAG is due if any expression matches the current minute.
#[derive(Clone)]
pub struct CronSet {
    exprs: Vec<CronExpr>,
}

impl CronSet {
    pub fn parse(expressions: &[String]) -> Result<Self, CronError> {
        let exprs = expressions.iter().map(|e| CronExpr::parse(e)).collect::<Result<_, _>>()?;
        Ok(Self { exprs })
    }

    pub fn is_due<Tz: TimeZone>(&self, now: DateTime<Tz>) -> bool
    where
        Tz::Offset: std::fmt::Display,
    {
        self.exprs.iter().any(|e| e.matches_minute(now.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone as _;

    #[test]
    fn every_minute_matches_any_time() {
        let expr = CronExpr::parse("* * * * *").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 12, 34, 0).unwrap();
        assert!(expr.matches_minute(now));
    }

    #[test]
    fn top_of_hour_does_not_match_other_minutes() {
        let expr = CronExpr::parse("0 * * * *").unwrap();
        let on_hour = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        let off_hour = Utc.with_ymd_and_hms(2026, 7, 28, 12, 1, 0).unwrap();
        assert!(expr.matches_minute(on_hour));
        assert!(!expr.matches_minute(off_hour));
    }

    #[test]
    fn invalid_expression_is_rejected() {
        assert!(CronExpr::parse("not a cron expr").is_err());
    }

    #[test]
    fn cron_set_is_due_if_any_member_matches() {
        let set = CronSet::parse(&["0 0 * * *".to_string(), "*/5 * * * *".to_string()]).unwrap();
        let due = Utc.with_ymd_and_hms(2026, 7, 28, 9, 5, 0).unwrap();
        let not_due = Utc.with_ymd_and_hms(2026, 7, 28, 9, 7, 0).unwrap();
        assert!(set.is_due(due));
        assert!(!set.is_due(not_due));
    }

    #[test]
    fn empty_cron_set_is_never_due() {
        let set = CronSet::parse(&[]).unwrap();
        assert!(set.is_empty());
        assert!(!set.is_due(Utc::now()));
    }
}
