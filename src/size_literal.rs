//! Human readable byte counts and rates, e.g. `1MB`, `1.5KB`, `256KiB` or a plain `1450`.
//!
//! Units are case insensitive: `b` is one byte, `kb` / `mb` are powers of 1000 and `kib` / `mib`
//!  are powers of 1024. Fractional values are evaluated exactly and rounded up to whole bytes.

use anyhow::{anyhow, bail};

/// Parses a size literal into a number of bytes
pub fn parse(literal: &str) -> anyhow::Result<u32> {
    let literal = literal.trim();
    if literal.is_empty() {
        bail!("empty size literal");
    }
    if literal.starts_with('-') {
        bail!("size literal must not be negative: '{}'", literal);
    }

    let number_len = literal
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(literal.len());
    let (number, unit) = literal.split_at(number_len);

    let multiplier: u128 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "kb" => 1000,
        "kib" => 1024,
        "mb" => 1000 * 1000,
        "mib" => 1024 * 1024,
        other => bail!("unknown unit '{}' in size literal '{}'", other, literal),
    };

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        bail!("size literal '{}' has no number", literal);
    }
    if frac_part.contains('.') {
        bail!("size literal '{}' is not a valid number", literal);
    }
    if int_part.len() + frac_part.len() > 30 {
        bail!("size literal '{}' is out of range", literal);
    }

    let digits = format!("{}{}", int_part, frac_part);
    let mantissa: u128 = digits.parse()
        .map_err(|_| anyhow!("size literal '{}' is not a valid number", literal))?;
    let scale = 10u128.pow(frac_part.len() as u32);

    let bytes = (mantissa * multiplier).div_ceil(scale);
    u32::try_from(bytes)
        .map_err(|_| anyhow!("size literal '{}' exceeds {} bytes", literal, u32::MAX))
}

/// Formats a number of bytes as a literal that [parse] maps back to exactly the same value,
///  using the largest decimal unit that needs no more than three fractional digits
pub fn format_size(bytes: u32) -> String {
    if bytes >= 1_000_000 && bytes % 1000 == 0 {
        format!("{}MB", decimal(bytes, 1_000_000, 6))
    }
    else if bytes >= 1000 {
        format!("{}KB", decimal(bytes, 1000, 3))
    }
    else {
        format!("{}B", bytes)
    }
}

pub fn format_rate(bytes_per_sec: u32) -> String {
    if bytes_per_sec == 0 {
        "unlimited B/s".to_string()
    }
    else {
        format!("{}/s", format_size(bytes_per_sec))
    }
}

fn decimal(value: u32, unit: u32, frac_digits: usize) -> String {
    let int_part = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return int_part.to_string();
    }

    let frac = format!("{:0width$}", frac, width = frac_digits);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("1450", 1450)]
    #[case::zero("0", 0)]
    #[case::bytes("723B", 723)]
    #[case::kb("1KB", 1000)]
    #[case::kb_lower("100kb", 100_000)]
    #[case::kib("1KiB", 1024)]
    #[case::kib_upper("256KIB", 262_144)]
    #[case::mb("1MB", 1_000_000)]
    #[case::mb_mixed("10Mb", 10_000_000)]
    #[case::mib("1MiB", 1_048_576)]
    #[case::fraction_kb("1.5KB", 1500)]
    #[case::fraction_mib("0.5MiB", 524_288)]
    #[case::fraction_rounds_up("1.0001KB", 1001)]
    #[case::fraction_bytes_rounds_up("10.1", 11)]
    #[case::leading_dot(".5KB", 500)]
    #[case::trailing_dot("2.MB", 2_000_000)]
    #[case::whitespace(" 4 kb ", 4000)]
    #[case::max("4294967295", u32::MAX)]
    fn test_parse(#[case] literal: &str, #[case] expected: u32) {
        assert_eq!(parse(literal).unwrap(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("  ")]
    #[case::negative("-1KB")]
    #[case::unit_only("KB")]
    #[case::dot_only(".")]
    #[case::two_dots("1.2.3KB")]
    #[case::unknown_unit("1GB")]
    #[case::garbage("abc")]
    #[case::too_big("4294967296")]
    #[case::too_big_unit("5000MB")]
    #[case::too_many_digits("1234567890123456789012345678901234567890")]
    fn test_parse_invalid(#[case] literal: &str) {
        assert!(parse(literal).is_err());
    }

    #[rstest]
    #[case(0, "0B")]
    #[case(723, "723B")]
    #[case(1000, "1KB")]
    #[case(1500, "1.5KB")]
    #[case(1001, "1.001KB")]
    #[case(1450, "1.45KB")]
    #[case(689_050, "689.05KB")]
    #[case(1_000_000, "1MB")]
    #[case(1_500_000, "1.5MB")]
    #[case(1_234_567, "1234.567KB")]
    #[case(10_000_000, "10MB")]
    fn test_format_size(#[case] bytes: u32, #[case] expected: &str) {
        assert_eq!(format_size(bytes), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(999)]
    #[case(1024)]
    #[case(262_144)]
    #[case(1_048_576)]
    #[case(1_000_001)]
    #[case(u32::MAX)]
    fn test_format_parses_back(#[case] bytes: u32) {
        assert_eq!(parse(&format_size(bytes)).unwrap(), bytes);
    }

    #[rstest]
    #[case(0, "unlimited B/s")]
    #[case(1_000_000, "1MB/s")]
    #[case(500, "500B/s")]
    fn test_format_rate(#[case] bytes_per_sec: u32, #[case] expected: &str) {
        assert_eq!(format_rate(bytes_per_sec), expected);
    }
}
