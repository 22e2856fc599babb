//! Display helpers shared by the provider parsers.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Truncates a label to `max` characters, appending `...` when cut.
pub fn shorten(name: &str, max: usize) -> String {
    if name.chars().count() <= max {
        return name.to_string();
    }
    let kept: String = name.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Formats a token count as `1M`, `32K`, or the plain number.
pub fn format_tokens(count: u64) -> String {
    if count >= 1_000_000 {
        format!("{}M", count / 1_000_000)
    } else if count >= 1_000 {
        format!("{}K", count / 1_000)
    } else {
        count.to_string()
    }
}

/// Formats an integer with comma thousands separators.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Returns the first day of the month and tomorrow (exclusive end).
pub fn month_to_date(now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let today = now.date_naive();
    let start = today.with_day(1).unwrap_or(today);
    (start, today + Duration::days(1))
}

/// Returns the invoice month in `YYYYMM` form.
pub fn invoice_month(now: DateTime<Utc>) -> String {
    now.format("%Y%m").to_string()
}

/// Sums amounts; an empty input is `0.0`, not `-0.0`.
pub fn total(amounts: impl IntoIterator<Item = f64>) -> f64 {
    amounts.into_iter().fold(0.0, |acc, amount| acc + amount)
}

/// Parses a numeric string, treating garbage as zero.
pub fn parse_amount(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}
