//! Recurrence rules for goals that come back after they are completed.
//!
//! Grammar (case-insensitive):
//!
//! ```text
//! daily
//! weekly:<weekday>[,<weekday>...]          mon,tue or monday,tuesday
//! monthly:months=<1..12,...>;days=<1..31,...>
//! ```
//!
//! `months=` may be left out of a monthly rule, meaning every month.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Upper bound for [`RecurrenceRule::next_occurrence`]; covers a Feb 29 rule.
const MAX_LOOKAHEAD_DAYS: u64 = 366 * 4 + 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceRule {
    Daily,
    /// Weekdays sorted Monday first, without duplicates.
    Weekly(Vec<Weekday>),
    Monthly {
        months: BTreeSet<u32>,
        days: BTreeSet<u32>,
    },
}

impl RecurrenceRule {
    /// Parse a rule. Anything malformed or empty yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let rule = raw.trim().to_ascii_lowercase();
        if rule == "daily" {
            return Some(Self::Daily);
        }
        if let Some(days) = rule.strip_prefix("weekly:") {
            return parse_weekdays(days).map(Self::Weekly);
        }
        if let Some(body) = rule.strip_prefix("monthly:") {
            return parse_monthly(body);
        }
        None
    }

    pub fn occurs_on(&self, date: NaiveDate) -> bool {
        match self {
            Self::Daily => true,
            Self::Weekly(days) => days.contains(&date.weekday()),
            Self::Monthly { months, days } => {
                months.contains(&date.month()) && days.contains(&date.day())
            }
        }
    }

    /// First date strictly after `after` on which the rule fires.
    pub fn next_occurrence(&self, after: NaiveDate) -> Option<NaiveDate> {
        (1..=MAX_LOOKAHEAD_DAYS)
            .filter_map(|offset| after.checked_add_days(Days::new(offset)))
            .find(|date| self.occurs_on(*date))
    }
}

impl fmt::Display for RecurrenceRule {
    /// The canonical form, which parses back to an equal rule.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Weekly(days) => {
                let names: Vec<&str> = days.iter().map(|d| weekday_token(*d)).collect();
                write!(f, "weekly:{}", names.join(","))
            }
            Self::Monthly { months, days } if months.len() == 12 => {
                write!(f, "monthly:days={}", join(days))
            }
            Self::Monthly { months, days } => {
                write!(f, "monthly:months={};days={}", join(months), join(days))
            }
        }
    }
}

fn join(values: &BTreeSet<u32>) -> String {
    values
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_weekdays(csv: &str) -> Option<Vec<Weekday>> {
    let mut days = Vec::new();
    for token in csv.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let day = weekday_from_token(token)?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return None;
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    Some(days)
}

fn weekday_from_token(token: &str) -> Option<Weekday> {
    let day = match token {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tues" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thur" | "thurs" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

fn weekday_token(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

fn parse_monthly(body: &str) -> Option<RecurrenceRule> {
    let mut months = None;
    let mut days = None;

    for part in body.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, values) = part.split_once('=')?;
        match key.trim() {
            "months" => months = Some(parse_numbers(values, 1..=12)?),
            "days" => days = Some(parse_numbers(values, 1..=31)?),
            _ => return None,
        }
    }

    Some(RecurrenceRule::Monthly {
        months: months.unwrap_or_else(|| (1..=12).collect()),
        days: days?,
    })
}

fn parse_numbers(csv: &str, range: std::ops::RangeInclusive<u32>) -> Option<BTreeSet<u32>> {
    let mut values = BTreeSet::new();
    for token in csv.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let value: u32 = token.parse().ok()?;
        if !range.contains(&value) {
            return None;
        }
        values.insert(value);
    }
    (!values.is_empty()).then_some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_parse_daily() {
        assert_eq!(RecurrenceRule::parse(" Daily "), Some(RecurrenceRule::Daily));
    }

    #[test]
    fn test_parse_weekly_accepts_short_and_full_names() {
        let rule = RecurrenceRule::parse("weekly:Friday,mon,MON").unwrap();
        assert_eq!(rule, RecurrenceRule::Weekly(vec![Weekday::Mon, Weekday::Fri]));
        assert_eq!(rule.to_string(), "weekly:mon,fri");
    }

    #[test]
    fn test_parse_monthly() {
        let rule = RecurrenceRule::parse("monthly:months=1,7;days=15,1").unwrap();
        assert_eq!(rule.to_string(), "monthly:months=1,7;days=1,15");
        assert!(rule.occurs_on(date("2025-07-15")));
        assert!(!rule.occurs_on(date("2025-08-15")));
    }

    #[test]
    fn test_monthly_without_months_means_every_month() {
        let rule = RecurrenceRule::parse("monthly:days=28").unwrap();
        assert!(rule.occurs_on(date("2025-02-28")));
        assert!(rule.occurs_on(date("2025-11-28")));
        assert_eq!(rule.to_string(), "monthly:days=28");
    }

    #[test]
    fn test_invalid_rules_parse_to_none() {
        for raw in [
            "",
            "hourly",
            "weekly:",
            "weekly:funday",
            "monthly:months=13;days=1",
            "monthly:months=1",
            "monthly:days=0",
            "monthly:weeks=1;days=2",
        ] {
            assert_eq!(RecurrenceRule::parse(raw), None, "{raw:?} should not parse");
        }
    }

    #[test]
    fn test_display_round_trips() {
        for raw in ["daily", "weekly:tue,sun", "monthly:months=2;days=29"] {
            let rule = RecurrenceRule::parse(raw).unwrap();
            assert_eq!(RecurrenceRule::parse(&rule.to_string()), Some(rule));
        }
    }

    #[test]
    fn test_next_occurrence() {
        let weekly = RecurrenceRule::parse("weekly:mon").unwrap();
        // 2025-06-02 is a Monday
        assert_eq!(weekly.next_occurrence(date("2025-06-02")), Some(date("2025-06-09")));

        let leap = RecurrenceRule::parse("monthly:months=2;days=29").unwrap();
        assert_eq!(leap.next_occurrence(date("2025-01-01")), Some(date("2028-02-29")));

        let never = RecurrenceRule::parse("monthly:months=2;days=31").unwrap();
        assert_eq!(never.next_occurrence(date("2025-01-01")), None);
    }
}
