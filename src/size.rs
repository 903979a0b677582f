//! Human-readable size tokens as printed by directory index pages.

use regex::Regex;
use std::sync::OnceLock;

fn unit_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+)([KGMTP])").unwrap())
}

fn unit_rank(unit: &str) -> u32 {
    match unit {
        "K" => 1,
        "M" => 2,
        "G" => 3,
        "T" => 4,
        "P" => 5,
        _ => 0,
    }
}

/// Converts a size token such as `"517M"` into bytes.
///
/// Units scale by powers of 1024 (`K` = 1024¹ up to `P` = 1024⁵). The first
/// `<digits><unit>` run found in the token wins, so `"1.2M"` reads as `2M`.
/// A bare integer is a byte count; anything else (e.g. the `-` shown for
/// directories) is 0.
///
/// # Example
///
/// ```
/// use gfsfetch::parse_size;
///
/// assert_eq!(parse_size("4K"), 4096);
/// assert_eq!(parse_size("12345"), 12345);
/// assert_eq!(parse_size("-"), 0);
/// ```
pub fn parse_size(token: &str) -> u64 {
    match unit_pattern().captures(token) {
        Some(caps) => {
            let digits: u64 = caps[1].parse().unwrap_or(0);
            digits.saturating_mul(1024u64.pow(unit_rank(&caps[2])))
        }
        None => token.trim().parse().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_scale_by_1024() {
        for (unit, rank) in [("K", 1), ("M", 2), ("G", 3), ("T", 4), ("P", 5)] {
            for digits in [1u64, 7, 42, 517] {
                assert_eq!(
                    parse_size(&format!("{}{}", digits, unit)),
                    digits * 1024u64.pow(rank),
                    "{}{}",
                    digits,
                    unit
                );
            }
        }
    }

    #[test]
    fn test_bare_integer_is_bytes() {
        assert_eq!(parse_size("12345"), 12345);
        assert_eq!(parse_size("0"), 0);
    }

    #[test]
    fn test_unparseable_is_zero() {
        assert_eq!(parse_size("-"), 0);
        assert_eq!(parse_size(""), 0);
        assert_eq!(parse_size("KB"), 0);
    }

    #[test]
    fn test_first_unit_run_wins() {
        assert_eq!(parse_size("1.2M"), 2 * 1024 * 1024);
    }
}
