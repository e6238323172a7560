//! ES|QL clause builders used before rendering a template.

use std::fmt;

/// Escape double quotes for an ES|QL string literal.
pub fn quote_literal(value: &str) -> String {
    value.replace('"', "\\\"")
}

/// `TRUE` when the value is absent or empty, otherwise `field == "value"`.
pub fn bool_filter(field: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if !v.is_empty() => format!("{} == \"{}\"", field, quote_literal(v)),
        _ => "TRUE".to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Day,
    Hour,
    Minute,
}

impl TimeUnit {
    pub fn esql_name(self) -> &'static str {
        match self {
            TimeUnit::Day => "day",
            TimeUnit::Hour => "hour",
            TimeUnit::Minute => "minute",
        }
    }

    /// Suffix used by Elasticsearch date math (`now-7d`).
    pub fn date_math_suffix(self) -> char {
        match self {
            TimeUnit::Day => 'd',
            TimeUnit::Hour => 'h',
            TimeUnit::Minute => 'm',
        }
    }

    pub fn as_duration(self, amount: u64) -> chrono::Duration {
        let amount = amount.min(i64::MAX as u64) as i64;
        match self {
            TimeUnit::Day => chrono::Duration::days(amount),
            TimeUnit::Hour => chrono::Duration::hours(amount),
            TimeUnit::Minute => chrono::Duration::minutes(amount),
        }
    }
}

/// A parsed `7d` / `24h` / `30m` window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeWindow {
    pub amount: u64,
    pub unit: TimeUnit,
}

impl RelativeWindow {
    pub fn parse(raw: &str) -> Option<Self> {
        let rel = raw.trim().to_lowercase();
        let unit = match rel.chars().last()? {
            'd' => TimeUnit::Day,
            'h' => TimeUnit::Hour,
            'm' => TimeUnit::Minute,
            _ => return None,
        };
        let amount = rel[..rel.len() - 1].trim().parse::<u64>().ok()?;
        Some(Self { amount, unit })
    }

    pub fn date_math(&self) -> String {
        format!("now-{}{}", self.amount, self.unit.date_math_suffix())
    }
}

impl fmt::Display for RelativeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.date_math_suffix())
    }
}

/// Time clause for a WHERE expression.
///
/// A relative window wins over explicit bounds. Relative strings that do not
/// parse are inserted raw, unescaped.
pub fn time_filter(
    ts_field: &str,
    start: Option<&str>,
    end: Option<&str>,
    relative: Option<&str>,
) -> String {
    fn non_empty(v: Option<&str>) -> Option<&str> {
        v.map(str::trim).filter(|v| !v.is_empty())
    }

    if let Some(rel) = non_empty(relative) {
        return match RelativeWindow::parse(rel) {
            Some(window) => format!(
                "{} >= NOW() - {} {}",
                ts_field,
                window.amount,
                window.unit.esql_name()
            ),
            None => format!("{} >= NOW() - {}", ts_field, rel.to_lowercase()),
        };
    }

    match (non_empty(start), non_empty(end)) {
        (Some(s), Some(e)) => format!(
            "{ts} >= TO_DATETIME(\"{s}\") AND {ts} < TO_DATETIME(\"{e}\")",
            ts = ts_field,
            s = quote_literal(s),
            e = quote_literal(e)
        ),
        (Some(s), None) => format!("{} >= TO_DATETIME(\"{}\")", ts_field, quote_literal(s)),
        (None, Some(e)) => format!("{} < TO_DATETIME(\"{}\")", ts_field, quote_literal(e)),
        (None, None) => "TRUE".to_string(),
    }
}

/// Absent ⇒ `default`; otherwise clamped into `[1, max]`.
pub fn clamp_limit(n: Option<i64>, default: u32, max: u32) -> u32 {
    match n {
        None => default,
        Some(n) => n.clamp(1, i64::from(max.max(1))) as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_filter() {
        assert_eq!(bool_filter("task", None), "TRUE");
        assert_eq!(bool_filter("task", Some("")), "TRUE");
        assert_eq!(bool_filter("task", Some("refund")), "task == \"refund\"");
        assert_eq!(
            bool_filter("domain", Some("a\"b")),
            "domain == \"a\\\"b\""
        );
    }

    #[test]
    fn test_relative_time_filter_units() {
        assert_eq!(time_filter("ts", None, None, Some("7d")), "ts >= NOW() - 7 day");
        assert_eq!(time_filter("ts", None, None, Some("24h")), "ts >= NOW() - 24 hour");
        assert_eq!(time_filter("ts", None, None, Some("30M")), "ts >= NOW() - 30 minute");
    }

    #[test]
    fn test_unrecognized_relative_passes_through_raw() {
        assert_eq!(
            time_filter("ts", None, None, Some("2 weeks")),
            "ts >= NOW() - 2 weeks"
        );
        // Known suffix but no number in front.
        assert_eq!(time_filter("ts", None, None, Some("xd")), "ts >= NOW() - xd");
    }

    #[test]
    fn test_explicit_bounds() {
        assert_eq!(
            time_filter("ts", Some("2024-01-01"), Some("2024-02-01"), None),
            "ts >= TO_DATETIME(\"2024-01-01\") AND ts < TO_DATETIME(\"2024-02-01\")"
        );
        assert_eq!(
            time_filter("ts", Some("2024-01-01"), None, None),
            "ts >= TO_DATETIME(\"2024-01-01\")"
        );
        assert_eq!(
            time_filter("ts", None, Some("2024-02-01"), None),
            "ts < TO_DATETIME(\"2024-02-01\")"
        );
        assert_eq!(time_filter("ts", None, None, None), "TRUE");
    }

    #[test]
    fn test_blank_bounds_are_ignored() {
        assert_eq!(
            time_filter("ts", Some("  2024-01-01 "), Some("   "), Some("")),
            "ts >= TO_DATETIME(\"2024-01-01\")"
        );
        assert_eq!(time_filter("ts", Some(""), None, Some(" ")), "TRUE");
    }

    #[test]
    fn test_relative_takes_precedence_over_bounds() {
        assert_eq!(
            time_filter("ts", Some("2024-01-01"), Some("2024-02-01"), Some("1d")),
            "ts >= NOW() - 1 day"
        );
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 20, 200), 20);
        assert_eq!(clamp_limit(Some(0), 20, 200), 1);
        assert_eq!(clamp_limit(Some(-5), 20, 200), 1);
        assert_eq!(clamp_limit(Some(1000), 20, 200), 200);
        assert_eq!(clamp_limit(Some(42), 20, 200), 42);
    }

    #[test]
    fn test_relative_window_date_math() {
        let w = RelativeWindow::parse("14d").unwrap();
        assert_eq!(w.date_math(), "now-14d");
        assert_eq!(w.to_string(), "14d");
        assert!(RelativeWindow::parse("d").is_none());
        assert!(RelativeWindow::parse("").is_none());
    }
}
