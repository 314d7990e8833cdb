use chrono::{Duration, NaiveDate, Utc};

/// Inclusive start/end dates for an upstream analytics query, formatted
/// the way the Search Console API expects (`YYYY-MM-DD`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The last `days` full days ending today. Search Console data lags
    /// by roughly two days; callers that care pass `days` accordingly.
    pub fn last_days(days: u32) -> Self {
        let end = Utc::now().date_naive();
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    /// The same-length window immediately before `self`, for
    /// period-over-period comparisons.
    pub fn previous(&self) -> Self {
        let span = self.end - self.start;
        Self {
            start: self.start - span - Duration::days(1),
            end: self.start - Duration::days(1),
        }
    }

    pub fn start_str(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

/// Percent change between two period totals, rendered with a sign.
/// A zero baseline reports "n/a" rather than inventing a percentage.
pub fn percent_change(current: f64, previous: f64) -> String {
    if previous == 0.0 {
        return "n/a".to_string();
    }
    let change = (current - previous) / previous * 100.0;
    format!("{change:+.1}%")
}

/// Click-through rate as a display percentage.
pub fn format_ctr(ctr: f64) -> String {
    format!("{:.2}%", ctr * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_days_spans_requested_window() {
        let range = DateRange::last_days(7);
        assert_eq!(range.end - range.start, Duration::days(7));
    }

    #[test]
    fn previous_window_is_adjacent_and_same_length() {
        let range = DateRange {
            start: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
        };
        let prev = range.previous();
        assert_eq!(prev.end, NaiveDate::from_ymd_opt(2026, 6, 30).unwrap());
        assert_eq!(prev.end - prev.start, range.end - range.start);
    }

    #[test]
    fn percent_change_handles_zero_baseline() {
        assert_eq!(percent_change(10.0, 0.0), "n/a");
        assert_eq!(percent_change(15.0, 10.0), "+50.0%");
        assert_eq!(percent_change(5.0, 10.0), "-50.0%");
    }

    #[test]
    fn ctr_formats_as_percentage() {
        assert_eq!(format_ctr(0.0512), "5.12%");
    }
}
