// 🔢 Locale Normalizer - Brazilian numeric entry
// Turns "1.234,56", "2,50", "2.300" or "2300.00" into f64 and back into display form
//
// The one rule that matters: a separator followed by exactly 3 digits is a
// thousands separator. Parsing and re-parsing of formatted values both go
// through the same heuristic, otherwise "2.300" silently becomes 2.3.

use chrono::NaiveDate;

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Anything the normalizer accepts: user text, stored text, or a number
/// that already went through a driver.
pub trait IntoDecimal {
    fn into_decimal(self) -> f64;
}

impl IntoDecimal for f64 {
    fn into_decimal(self) -> f64 {
        finite_or_zero(self)
    }
}

impl IntoDecimal for f32 {
    fn into_decimal(self) -> f64 {
        finite_or_zero(self as f64)
    }
}

impl IntoDecimal for i64 {
    fn into_decimal(self) -> f64 {
        self as f64
    }
}

impl IntoDecimal for i32 {
    fn into_decimal(self) -> f64 {
        self as f64
    }
}

impl IntoDecimal for &str {
    fn into_decimal(self) -> f64 {
        parse_text(self)
    }
}

impl IntoDecimal for String {
    fn into_decimal(self) -> f64 {
        parse_text(&self)
    }
}

impl IntoDecimal for &String {
    fn into_decimal(self) -> f64 {
        parse_text(self)
    }
}

/// Missing values count as zero
impl<T: IntoDecimal> IntoDecimal for Option<T> {
    fn into_decimal(self) -> f64 {
        self.map(IntoDecimal::into_decimal).unwrap_or(0.0)
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a Brazilian or canonical numeric value.
///
/// Never fails: malformed input yields `0.0`. Callers that must tell an
/// explicit zero apart from garbage have to validate the raw text first.
///
/// # Examples:
/// ```
/// use okr_tracker::locale::parse_decimal;
/// assert_eq!(parse_decimal("2.300"), 2300.0);
/// assert_eq!(parse_decimal("2,50"), 2.5);
/// assert_eq!(parse_decimal("1.234.567,89"), 1234567.89);
/// assert_eq!(parse_decimal("2300.00"), 2300.0);
/// ```
pub fn parse_decimal<T: IntoDecimal>(input: T) -> f64 {
    input.into_decimal()
}

fn parse_text(input: &str) -> f64 {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return 0.0;
    }

    // Fast path: values round-tripped from storage
    if is_canonical(trimmed) {
        return parse_plain(trimmed);
    }

    // "-R$ 2,50" and "R$ -2,50" are both negative
    let negative = trimmed
        .chars()
        .take_while(|c| !c.is_ascii_digit())
        .any(|c| c == '-');

    // Drops "R$", spaces, the sign and any other decoration
    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let value = parse_plain(&disambiguate(&cleaned));

    if negative {
        -value
    } else {
        value
    }
}

/// `^\d+\.?\d*$`, minus the "2.300" shape which belongs to the thousands rule.
///
/// A single period with exactly three fraction digits is only a thousands
/// separator when the integer part could be a leading group (1-3 digits, not "0").
fn is_canonical(s: &str) -> bool {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (s, None),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    match frac_part {
        None => true,
        Some(frac) => {
            if !frac.bytes().all(|b| b.is_ascii_digit()) {
                return false;
            }
            let looks_grouped = frac.len() == 3 && int_part.len() <= 3 && int_part != "0";
            !looks_grouped
        }
    }
}

/// Rewrite a digits-and-separators string into canonical form
fn disambiguate(s: &str) -> String {
    let has_comma = s.contains(',');
    let has_period = s.contains('.');

    match (has_comma, has_period) {
        // "1.234.567,89": periods group, the last comma is the decimal point
        (true, true) => promote_last(&s.replace('.', ""), ','),

        // "2,50" vs "2,500"
        (true, false) => {
            if digits_after_last(s, ',') <= 2 {
                promote_last(s, ',')
            } else {
                s.replace(',', "")
            }
        }

        // "1.234.567" vs "1.234.56" vs ".50"
        (false, true) => match digits_after_last(s, '.') {
            1 | 2 => promote_last(s, '.'),
            _ => s.replace('.', ""),
        },

        (false, false) => s.to_string(),
    }
}

/// Keep `sep`'s last occurrence as the decimal point, drop every other separator
fn promote_last(s: &str, sep: char) -> String {
    match s.rfind(sep) {
        Some(pos) => {
            let head: String = s[..pos].chars().filter(|c| c.is_ascii_digit()).collect();
            let tail: String = s[pos + 1..].chars().filter(|c| c.is_ascii_digit()).collect();
            format!("{}.{}", head, tail)
        }
        None => s.to_string(),
    }
}

fn digits_after_last(s: &str, sep: char) -> usize {
    s.rfind(sep)
        .map(|pos| s[pos + 1..].chars().filter(|c| c.is_ascii_digit()).count())
        .unwrap_or(0)
}

fn parse_plain(s: &str) -> f64 {
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return 0.0;
    }
    s.parse::<f64>().map(finite_or_zero).unwrap_or(0.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

/// Brazilian display form: "1.234.567,89", fixed to `decimals` places.
/// This is the canonical round-trip display format.
pub fn format_decimal(value: f64, decimals: usize) -> String {
    let value = finite_or_zero(value);
    let fixed = format!("{:.*}", decimals, value.abs());

    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    // "-0,00" is not a thing
    let rounds_to_zero = fixed.bytes().all(|b| b == b'0' || b == b'.');
    let sign = if value < 0.0 && !rounds_to_zero { "-" } else { "" };

    let grouped = group_thousands(int_part);

    match frac_part {
        Some(frac) => format!("{}{},{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

/// `format_decimal` with the default two places
pub fn format_br(value: f64) -> String {
    format_decimal(value, 2)
}

/// Display-only variant without trailing fraction zeros ("2,5", "2.300").
/// Don't store these.
pub fn format_compact(value: f64, max_decimals: usize) -> String {
    let full = format_decimal(value, max_decimals);

    if !full.contains(',') {
        return full;
    }

    full.trim_end_matches('0').trim_end_matches(',').to_string()
}

/// Storage form: plain ASCII, period as the only separator, two places
pub fn to_canonical(value: f64) -> String {
    let value = finite_or_zero(value);
    let fixed = format!("{:.2}", value);

    if fixed.trim_start_matches('-').bytes().all(|b| b == b'0' || b == b'.') {
        "0.00".to_string()
    } else {
        fixed
    }
}

fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }

    out
}

// ============================================================================
// DATES
// ============================================================================

/// Accepts "dd/mm/yyyy" (BR date input) and ISO "yyyy-mm-dd"
pub fn parse_br_date(input: &str) -> Option<NaiveDate> {
    let trimmed = input.trim();

    NaiveDate::parse_from_str(trimmed, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .ok()
}

pub fn format_br_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_heuristic() {
        assert_eq!(parse_decimal("2.300"), 2300.0);
        assert_eq!(parse_decimal("2.50"), 2.5);
        assert_eq!(parse_decimal("12.500"), 12500.0);
        assert_eq!(parse_decimal("1.234.567,89"), 1234567.89);

        // With both marks present the period always groups
        assert_eq!(parse_decimal("1,234.56"), 1.23456);
    }

    #[test]
    fn test_canonical_fast_path() {
        assert_eq!(parse_decimal("2300.00"), 2300.0);
        assert_eq!(parse_decimal("2300"), 2300.0);
        assert_eq!(parse_decimal("0.75"), 0.75);
        assert_eq!(parse_decimal("12."), 12.0);

        // Integer part too long to be a leading group
        assert_eq!(parse_decimal("1234.567"), 1234.567);

        // Nobody writes a leading group of "0"
        assert_eq!(parse_decimal("0.500"), 0.5);
    }

    #[test]
    fn test_comma_only() {
        assert_eq!(parse_decimal("2,50"), 2.5);
        assert_eq!(parse_decimal("2,5"), 2.5);
        assert_eq!(parse_decimal("2,500"), 2500.0);
        assert_eq!(parse_decimal("1,234,567"), 1234567.0);
        assert_eq!(parse_decimal("12,"), 12.0);
    }

    #[test]
    fn test_period_only_non_canonical() {
        assert_eq!(parse_decimal("1.234.567"), 1234567.0);
        assert_eq!(parse_decimal("1.234.56"), 1234.56);
        assert_eq!(parse_decimal(".50"), 0.5);
        assert_eq!(parse_decimal("1.2345.6789"), 1.2345_6789e8);
    }

    #[test]
    fn test_decorations_and_sign() {
        assert_eq!(parse_decimal("R$ 1.234,56"), 1234.56);
        assert_eq!(parse_decimal("  2,50  "), 2.5);
        assert_eq!(parse_decimal("-2,50"), -2.5);
        assert_eq!(parse_decimal("-2300.00"), -2300.0);
        assert_eq!(parse_decimal("45%"), 45.0);
    }

    #[test]
    fn test_sign_after_currency_symbol() {
        assert_eq!(parse_decimal("R$ -2,50"), -2.5);
        assert_eq!(parse_decimal("-R$ 2,50"), -2.5);
        assert_eq!(parse_decimal("R$-1.234,56"), -1234.56);
        // A dash after the digits is not a sign
        assert_eq!(parse_decimal("2,50-"), 2.5);
    }

    #[test]
    fn test_malformed_is_zero() {
        assert_eq!(parse_decimal(""), 0.0);
        assert_eq!(parse_decimal("   "), 0.0);
        assert_eq!(parse_decimal("abc"), 0.0);
        assert_eq!(parse_decimal(","), 0.0);
        assert_eq!(parse_decimal("."), 0.0);
        assert_eq!(parse_decimal("inf"), 0.0);
        assert_eq!(parse_decimal("NaN"), 0.0);
    }

    #[test]
    fn test_numeric_inputs() {
        assert_eq!(parse_decimal(2.5_f64), 2.5);
        assert_eq!(parse_decimal(f64::NAN), 0.0);
        assert_eq!(parse_decimal(f64::INFINITY), 0.0);
        assert_eq!(parse_decimal(42_i64), 42.0);
        assert_eq!(parse_decimal(None::<&str>), 0.0);
        assert_eq!(parse_decimal(Some("1.000,00")), 1000.0);
        assert_eq!(parse_decimal(String::from("2,50")), 2.5);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(1234567.89, 2), "1.234.567,89");
        assert_eq!(format_decimal(2300.0, 2), "2.300,00");
        assert_eq!(format_decimal(2.5, 2), "2,50");
        assert_eq!(format_decimal(999.0, 2), "999,00");
        assert_eq!(format_decimal(1000.0, 0), "1.000");
        assert_eq!(format_decimal(-1234.5, 1), "-1.234,5");
        assert_eq!(format_decimal(-0.001, 2), "0,00");
        assert_eq!(format_decimal(f64::NAN, 2), "0,00");
        assert_eq!(format_br(833.333), "833,33");
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_compact(2.5, 2), "2,5");
        assert_eq!(format_compact(2300.0, 2), "2.300");
        assert_eq!(format_compact(1234.56, 2), "1.234,56");
        assert_eq!(format_compact(7.0, 0), "7");
    }

    #[test]
    fn test_round_trip_through_display() {
        for v in [0.0, 0.5, 2.5, 99.99, 833.33, 2300.0, 12500.0, 1234567.89, -45.1] {
            assert_eq!(parse_decimal(format_decimal(v, 2).as_str()), v, "display {}", v);
            assert_eq!(parse_decimal(to_canonical(v)), v, "canonical {}", v);
        }

        // Whole numbers survive the zero-decimals form too
        assert_eq!(parse_decimal(format_decimal(2300.0, 0).as_str()), 2300.0);
        assert_eq!(parse_decimal(format_decimal(2300000.0, 0).as_str()), 2300000.0);
    }

    #[test]
    fn test_to_canonical() {
        assert_eq!(to_canonical(2300.0), "2300.00");
        assert_eq!(to_canonical(1666.666), "1666.67");
        assert_eq!(to_canonical(-0.0), "0.00");
        assert_eq!(to_canonical(f64::NAN), "0.00");
    }

    #[test]
    fn test_br_dates() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        assert_eq!(parse_br_date("31/03/2025"), Some(d));
        assert_eq!(parse_br_date("2025-03-31"), Some(d));
        assert_eq!(parse_br_date("31/02/2025"), None);
        assert_eq!(parse_br_date("amanhã"), None);
        assert_eq!(format_br_date(d), "31/03/2025");
    }
}
