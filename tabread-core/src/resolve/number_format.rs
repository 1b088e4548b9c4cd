//! Number format descriptors: builtin lookup, date detection and decimal rendering

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime};

/// Canonical rendering used for every date/time formatted cell (`MM/dd/yyyy`)
pub const CANONICAL_DATE_PATTERN: &str = "%m/%d/%Y";

/// Format descriptor attached to a numeric cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    /// Format id (builtin ids are below 164)
    pub index: u32,
    /// Format code, e.g. "General", "0.00", "mm/dd/yyyy"
    pub code: String,
}

impl NumberFormat {
    pub fn new(index: u32, code: impl Into<String>) -> Self {
        Self {
            index,
            code: code.into(),
        }
    }

    /// Descriptor for a builtin id, `General` when the id is unknown
    pub fn builtin(index: u32) -> Self {
        Self::new(index, builtin_format_code(index).unwrap_or("General"))
    }

    pub fn is_date(&self) -> bool {
        is_date_format(self.index, &self.code)
    }
}

/// Which epoch serial day numbers count from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSystem {
    #[default]
    Excel1900,
    Excel1904,
}

/// Format code for a builtin number format id
pub fn builtin_format_code(id: u32) -> Option<&'static str> {
    match id {
        0 => Some("General"),
        1 => Some("0"),
        2 => Some("0.00"),
        3 => Some("#,##0"),
        4 => Some("#,##0.00"),
        5 => Some("\"$\"#,##0_);(\"$\"#,##0)"),
        6 => Some("\"$\"#,##0_);[Red](\"$\"#,##0)"),
        7 => Some("\"$\"#,##0.00_);(\"$\"#,##0.00)"),
        8 => Some("\"$\"#,##0.00_);[Red](\"$\"#,##0.00)"),
        9 => Some("0%"),
        10 => Some("0.00%"),
        11 => Some("0.00E+00"),
        12 => Some("# ?/?"),
        13 => Some("# ??/??"),
        14 => Some("m/d/yy"),
        15 => Some("d-mmm-yy"),
        16 => Some("d-mmm"),
        17 => Some("mmm-yy"),
        18 => Some("h:mm AM/PM"),
        19 => Some("h:mm:ss AM/PM"),
        20 => Some("h:mm"),
        21 => Some("h:mm:ss"),
        22 => Some("m/d/yy h:mm"),
        37 => Some("#,##0_);(#,##0)"),
        38 => Some("#,##0_);[Red](#,##0)"),
        39 => Some("#,##0.00_);(#,##0.00)"),
        40 => Some("#,##0.00_);[Red](#,##0.00)"),
        41 => Some(r#"_(* #,##0_);_(* \(#,##0\);_(* "-"_);_(@_)"#),
        42 => Some(r#"_("$"* #,##0_);_("$"* \(#,##0\);_("$"* "-"_);_(@_)"#),
        43 => Some(r#"_(* #,##0.00_);_(* \(#,##0.00\);_(* "-"??_);_(@_)"#),
        44 => Some(r#"_("$"* #,##0.00_);_("$"* \(#,##0.00\);_("$"* "-"??_);_(@_)"#),
        45 => Some("mm:ss"),
        46 => Some("[h]:mm:ss"),
        47 => Some("mm:ss.0"),
        48 => Some("##0.0E+0"),
        49 => Some("@"),
        _ => None,
    }
}

/// Whether a format id/code renders a date or time
pub fn is_date_format(index: u32, code: &str) -> bool {
    if matches!(index, 14..=22 | 27..=36 | 45..=47 | 50..=58) {
        return true;
    }
    is_date_format_code(code)
}

/// Scan the first section of a format code for date/time tokens outside
/// quotes, escapes and bracketed modifiers.
fn is_date_format_code(code: &str) -> bool {
    let mut escaped = false;
    let mut in_quotes = false;
    let mut brackets = 0u8;
    let mut am_pm = false;

    for c in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if in_quotes {
            if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '_' | '\\' => escaped = true,
            '"' => in_quotes = true,
            ';' => return false,
            '[' => brackets += 1,
            ']' => brackets = brackets.saturating_sub(1),
            _ if brackets > 0 => {}
            'a' | 'A' => am_pm = true,
            'p' | 'P' | 'm' | 'M' | '/' if am_pm => return true,
            'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S' => return true,
            _ => {}
        }
    }
    false
}

/// Plain decimal rendering: integral values without a fractional part,
/// everything else in shortest round-trip form.
pub fn format_plain(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// `General` rendering: at most ten significant digits, scientific
/// notation outside `1e-10..1e11`, no trailing zeros.
pub fn format_general(value: f64) -> String {
    if !value.is_finite() {
        return format_plain(value);
    }
    let abs = value.abs();
    if abs == 0.0 {
        return "0".to_string();
    }
    if abs >= 1e11 || abs <= 1e-10 {
        let rendered = format!("{:.5e}", value);
        return match rendered.split_once('e') {
            Some((mantissa, exponent)) => {
                format!("{}E{}", trim_fraction(mantissa), exponent)
            }
            None => rendered,
        };
    }
    if value.fract() == 0.0 || abs >= 1e10 {
        return format!("{:.0}", value);
    }
    let magnitude = abs.log10().floor() as i32;
    let decimals = (9 - magnitude).clamp(0, 10) as usize;
    trim_fraction(&format!("{:.*}", decimals, value)).to_string()
}

fn trim_fraction(rendered: &str) -> &str {
    if rendered.contains('.') {
        rendered.trim_end_matches('0').trim_end_matches('.')
    } else {
        rendered
    }
}

/// Render an ISO 8601 date or date-time as `MM/dd/yyyy`
pub fn format_iso_date(text: &str) -> Option<String> {
    let text = text.trim();
    let date = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|pattern| NaiveDateTime::parse_from_str(text, pattern).ok())
        .map(|dt| dt.date())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(text, "%Y-%m-%d").ok())?;
    Some(date.format(CANONICAL_DATE_PATTERN).to_string())
}

/// Render a serial day number as `MM/dd/yyyy`.
///
/// Returns `None` for negative or out-of-range serials.
pub fn format_date(serial: f64, system: DateSystem) -> Option<String> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    // Tiny tolerance so 44927.9999999 style artifacts stay on the same day
    let days = (serial + 1e-9).floor() as u64;
    let base = match system {
        // Serials 1..60 predate the fictitious 1900-02-29
        DateSystem::Excel1900 if days < 61 => NaiveDate::from_ymd_opt(1899, 12, 31)?,
        DateSystem::Excel1900 => NaiveDate::from_ymd_opt(1899, 12, 30)?,
        DateSystem::Excel1904 => NaiveDate::from_ymd_opt(1904, 1, 1)?,
    };
    let date = base.checked_add_days(Days::new(days))?;
    Some(date.format(CANONICAL_DATE_PATTERN).to_string())
}

/// Apply the decimal part of a format code to a value.
///
/// Supports `General`, `@`, fixed decimals, thousands grouping, percent,
/// scientific notation and literal prefix/suffix text. Fractions and other
/// codes without digit placeholders fall back to the plain rendering.
pub fn format_decimal(value: f64, code: &str) -> String {
    let section = select_section(code, value);
    let cleaned = strip_modifiers(section.code);
    let trimmed = cleaned.trim();

    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("general") || trimmed == "@" {
        return format_general(value);
    }
    if trimmed.contains('?') || trimmed.contains('/') {
        return format_plain(value);
    }

    let mut v = if section.absolute { value.abs() } else { value };
    if cleaned.contains('%') {
        v *= 100.0;
    }

    if let Some(exp_pos) = find_exponent(&cleaned) {
        let mantissa = &cleaned[..exp_pos];
        let Some(first) = mantissa.find(['0', '#', '.']) else {
            return format_plain(value);
        };
        let prefix = &mantissa[..first];
        let decimals = count_decimals(&mantissa[first..]).0;
        let exponent = &cleaned[exp_pos + 1..];
        let digits_end = exponent
            .find(|c: char| !matches!(c, '+' | '-' | '0' | '#'))
            .unwrap_or(exponent.len());
        let width = exponent[..digits_end].matches('0').count().max(1);
        let suffix = &exponent[digits_end..];
        return format!(
            "{}{}{}",
            prefix,
            format_scientific(v, decimals, width),
            suffix
        );
    }

    let Some(first) = cleaned.find(['0', '#', '.']) else {
        return format_plain(value);
    };
    let last = cleaned.rfind(['0', '#', '.', ',']).unwrap_or(first);
    let prefix = &cleaned[..first];
    let body = &cleaned[first..=last];
    let suffix = &cleaned[last + 1..];

    format!("{}{}{}", prefix, format_fixed(v, body), suffix)
}

/// Position of an `E+`/`E-` exponent marker
fn find_exponent(code: &str) -> Option<usize> {
    let bytes = code.as_bytes();
    (0..bytes.len().saturating_sub(1)).find(|&i| {
        matches!(bytes[i], b'E' | b'e') && matches!(bytes[i + 1], b'+' | b'-')
    })
}

struct Section<'a> {
    code: &'a str,
    /// The section carries its own sign (negative section), so render |value|
    absolute: bool,
}

/// Pick the positive/negative/zero section of a multi-section code
fn select_section(code: &str, value: f64) -> Section<'_> {
    let sections = split_sections(code);
    match sections[..] {
        [first] => Section {
            code: first,
            absolute: false,
        },
        [_, second, ..] if value < 0.0 => Section {
            code: second,
            absolute: true,
        },
        [_, _, third, ..] if value == 0.0 => Section {
            code: third,
            absolute: false,
        },
        [first, ..] => Section {
            code: first,
            absolute: false,
        },
        [] => Section {
            code,
            absolute: false,
        },
    }
}

/// Split on `;` outside quotes
fn split_sections(code: &str) -> Vec<&str> {
    let mut sections = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in code.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                sections.push(&code[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    sections.push(&code[start..]);
    sections
}

/// Remove `[...]` modifiers, `_x` padding and `*x` fill; unquote literals
fn strip_modifiers(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                for n in chars.by_ref() {
                    if n == ']' {
                        break;
                    }
                }
            }
            '_' | '*' => {
                chars.next();
            }
            '\\' => {
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            }
            '"' => {
                for n in chars.by_ref() {
                    if n == '"' {
                        break;
                    }
                    out.push(n);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// (total decimal placeholders, required zeros) after the decimal point
fn count_decimals(body: &str) -> (usize, usize) {
    match body.split_once('.') {
        Some((_, frac)) => {
            let total = frac.chars().filter(|c| matches!(c, '0' | '#')).count();
            let zeros = frac.chars().filter(|&c| c == '0').count();
            (total, zeros)
        }
        None => (0, 0),
    }
}

fn format_fixed(value: f64, body: &str) -> String {
    let (decimals, min_decimals) = count_decimals(body);
    let integer_part = body.split('.').next().unwrap_or("");
    let grouping = integer_part.trim_end_matches(',').contains(',');
    // Trailing commas scale by 1000 each
    let scale_commas = integer_part.len() - integer_part.trim_end_matches(',').len();
    let value = value / 1000f64.powi(scale_commas as i32);

    let mut rendered = format!("{:.*}", decimals, value);
    if decimals > min_decimals {
        let keep = rendered.len() - (decimals - min_decimals);
        while rendered.len() > keep && rendered.ends_with('0') {
            rendered.pop();
        }
        if rendered.ends_with('.') {
            rendered.pop();
        }
    }
    if rendered.starts_with('-') && rendered[1..].chars().all(|c| c == '0' || c == '.') {
        rendered.remove(0);
    }
    if grouping {
        rendered = group_thousands(&rendered);
    }
    rendered
}

fn group_thousands(rendered: &str) -> String {
    let (sign, unsigned) = match rendered.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", rendered),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

fn format_scientific(value: f64, decimals: usize, width: usize) -> String {
    let rendered = format!("{:.*e}", decimals, value);
    match rendered.split_once('e') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}E{}{:0width$}", mantissa, sign, exp.abs(), width = width)
        }
        None => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin_format_code(0), Some("General"));
        assert_eq!(builtin_format_code(14), Some("m/d/yy"));
        assert_eq!(builtin_format_code(200), None);
        assert_eq!(NumberFormat::builtin(200).code, "General");
    }

    #[test]
    fn test_date_detection() {
        assert!(is_date_format(14, "m/d/yy"));
        assert!(is_date_format(22, ""));
        assert!(is_date_format(164, "yyyy-mm-dd"));
        assert!(is_date_format(164, "dd/mm/yy hh:mm"));
        assert!(is_date_format(170, "[$-409]mmmm d, yyyy"));
        assert!(!is_date_format(0, "General"));
        assert!(!is_date_format(2, "0.00"));
        assert!(!is_date_format(164, "#,##0.00 \"days\""));
        assert!(!is_date_format(164, "[Red]0.00"));
    }

    #[test]
    fn test_format_plain() {
        assert_eq!(format_plain(1.0), "1");
        assert_eq!(format_plain(-42.0), "-42");
        assert_eq!(format_plain(2.5), "2.5");
        assert_eq!(format_plain(0.1), "0.1");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(45139.0, DateSystem::Excel1900).as_deref(), Some("08/01/2023"));
        assert_eq!(format_date(45139.75, DateSystem::Excel1900).as_deref(), Some("08/01/2023"));
        assert_eq!(format_date(1.0, DateSystem::Excel1900).as_deref(), Some("01/01/1900"));
        assert_eq!(format_date(61.0, DateSystem::Excel1900).as_deref(), Some("03/01/1900"));
        assert_eq!(format_date(0.0, DateSystem::Excel1904).as_deref(), Some("01/01/1904"));
        assert_eq!(format_date(-1.0, DateSystem::Excel1900), None);
    }

    #[test]
    fn test_format_general_hides_float_noise() {
        assert_eq!(format_general(0.30000000000000004), "0.3");
        assert_eq!(format_general(3.3000000000000003), "3.3");
        assert_eq!(format_general(1.0 / 3.0), "0.3333333333");
        assert_eq!(format_general(123456.789), "123456.789");
        assert_eq!(format_general(-2.5), "-2.5");
        assert_eq!(format_general(-0.0), "0");
        assert_eq!(format_general(42.0), "42");
        assert_eq!(format_general(12345678901.0), "12345678901");
        assert_eq!(format_general(123456789012.0), "1.23457E11");
        assert_eq!(format_general(0.00000000001), "1E-11");
        assert_eq!(format_decimal(0.30000000000000004, "General"), "0.3");
        // No format at all keeps the shortest round-trip form
        assert_eq!(format_plain(0.30000000000000004), "0.30000000000000004");
    }

    #[test]
    fn test_format_iso_date() {
        assert_eq!(format_iso_date("2023-08-01").as_deref(), Some("08/01/2023"));
        assert_eq!(format_iso_date("2023-08-01T13:45:00").as_deref(), Some("08/01/2023"));
        assert_eq!(format_iso_date("2023-08-01T13:45:00.250").as_deref(), Some("08/01/2023"));
        assert_eq!(format_iso_date("2023-08-01T23:00:00Z").as_deref(), Some("08/01/2023"));
        assert_eq!(format_iso_date(" 1999-12-31 ").as_deref(), Some("12/31/1999"));
        assert_eq!(format_iso_date("yesterday"), None);
    }

    #[test]
    fn test_accounting_builtins() {
        for id in 41..=44 {
            let format = NumberFormat::builtin(id);
            assert_ne!(format.code, "General");
            assert!(!format.is_date());
        }
        assert_eq!(format_decimal(1234.0, &NumberFormat::builtin(41).code), "1,234");
        assert_eq!(format_decimal(-1234.0, &NumberFormat::builtin(41).code), "(1,234)");
        assert_eq!(format_decimal(1234.5, &NumberFormat::builtin(43).code), "1,234.50");
        assert_eq!(format_decimal(-5.5, &NumberFormat::builtin(44).code), "$(5.50)");
    }

    #[test]
    fn test_format_decimal_fixed() {
        assert_eq!(format_decimal(3.14159, "0.00"), "3.14");
        assert_eq!(format_decimal(3.0, "0"), "3");
        assert_eq!(format_decimal(2.5, "0.0#"), "2.5");
        assert_eq!(format_decimal(2.567, "0.0#"), "2.57");
        assert_eq!(format_decimal(1234567.891, "#,##0.00"), "1,234,567.89");
        assert_eq!(format_decimal(-1234.0, "#,##0"), "-1,234");
        assert_eq!(format_decimal(42.0, "General"), "42");
        assert_eq!(format_decimal(42.5, "@"), "42.5");
    }

    #[test]
    fn test_format_decimal_percent_and_literals() {
        assert_eq!(format_decimal(0.256, "0.0%"), "25.6%");
        assert_eq!(format_decimal(0.5, "0%"), "50%");
        assert_eq!(format_decimal(12.5, "\"$\"#,##0.00"), "$12.50");
        assert_eq!(format_decimal(3.0, "0 \"units\""), "3 units");
    }

    #[test]
    fn test_format_decimal_sections() {
        assert_eq!(format_decimal(-5.0, "#,##0_);(#,##0)"), "(5)");
        assert_eq!(format_decimal(5.0, "#,##0_);(#,##0)"), "5");
        assert_eq!(format_decimal(-5.0, "#,##0_);[Red](#,##0)"), "(5)");
    }

    #[test]
    fn test_format_decimal_scientific() {
        assert_eq!(format_decimal(12345.678, "0.00E+00"), "1.23E+04");
        assert_eq!(format_decimal(0.00012, "0.00E+00"), "1.20E-04");
    }

    #[test]
    fn test_format_decimal_unsupported_falls_back() {
        assert_eq!(format_decimal(0.5, "# ?/?"), "0.5");
    }
}
