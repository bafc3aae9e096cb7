//! Calendar week used by the weekly view

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// A Monday-to-Sunday week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Week {
    start: NaiveDate,
}

impl Week {
    /// The week that contains `date`
    pub fn containing(date: NaiveDate) -> Self {
        let offset = date.weekday().num_days_from_monday() as i64;
        Self {
            start: date - Duration::days(offset),
        }
    }

    /// Monday of this week
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.start + Duration::days(6)
    }

    /// The seven dates of the week, Monday first
    pub fn dates(&self) -> Vec<NaiveDate> {
        (0..7).map(|i| self.start + Duration::days(i)).collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end()
    }

    pub fn next(&self) -> Self {
        Self {
            start: self.start + Duration::days(7),
        }
    }

    pub fn previous(&self) -> Self {
        Self {
            start: self.start - Duration::days(7),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_starts_on_monday() {
        // 2024-03-07 is a Thursday
        let week = Week::containing(date(2024, 3, 7));
        assert_eq!(week.start(), date(2024, 3, 4));
        assert_eq!(week.start().weekday(), Weekday::Mon);
        assert_eq!(week.end(), date(2024, 3, 10));

        // Sunday belongs to the week that started six days earlier
        assert_eq!(Week::containing(date(2024, 3, 10)), week);
    }

    #[test]
    fn test_week_dates_and_navigation() {
        let week = Week::containing(date(2024, 1, 1));
        let dates = week.dates();
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0], date(2024, 1, 1));
        assert_eq!(dates[6], date(2024, 1, 7));

        assert_eq!(week.next().start(), date(2024, 1, 8));
        assert_eq!(week.previous().start(), date(2023, 12, 25));
        assert!(week.contains(date(2024, 1, 5)));
        assert!(!week.contains(date(2024, 1, 8)));
    }
}
