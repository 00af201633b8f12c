use crate::error::{DashboardError, Result};
use chrono::{DateTime, Months, NaiveDate};

/// Parses a record's date field.
///
/// Accepts `YYYY-MM-DD`, full RFC 3339 timestamps and `YYYY-MM` (read as the
/// first of the month). Returns `None` for anything else, including empty text.
pub fn parse_record_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp.date_naive());
    }

    NaiveDate::parse_from_str(&format!("{}-01", trimmed), "%Y-%m-%d").ok()
}

/// The leading `YYYY-MM` of a date string, or the whole string if shorter.
pub fn year_month(raw: &str) -> &str {
    match raw.char_indices().nth(7) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

pub fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Population standard deviation (divides by N). Zero for an empty slice.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let avg = mean(values.iter().copied());
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// `(current - previous) / previous * 100`, or 0 when `previous` is 0.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Start of a trailing window of `months` calendar months ending at `end`.
pub fn months_before(end: NaiveDate, months: u32) -> Result<NaiveDate> {
    end.checked_sub_months(Months::new(months)).ok_or_else(|| {
        DashboardError::DateError(format!(
            "Cannot step back {} months from {}",
            months, end
        ))
    })
}

/// Three-letter month label for a period string (`"2024-03-31"` -> `"Mar"`).
pub fn month_label(period: &str) -> Option<String> {
    parse_record_date(period).map(|d| d.format("%b").to_string())
}

/// Formats a number with thousands separators and at most three fraction
/// digits, trailing zeros trimmed (`180000` -> `"180,000"`, `1234.5` -> `"1,234.5"`).
pub fn format_grouped(value: f64) -> String {
    let rounded = round_to(value, 3);
    let negative = rounded < 0.0;
    let text = format!("{:.3}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let frac = frac_part.trim_end_matches('0');
    let sign = if negative { "-" } else { "" };
    if frac.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac)
    }
}
