/// Ban duration strings: `<number><unit>` with unit m (minutes), d (days),
/// M (30-day months) or P (permanent)
use crate::error::{DashboardError, DashboardResult};

const MINUTE_MS: i64 = 60 * 1000;
const DAY_MS: i64 = 24 * 60 * MINUTE_MS;
const MONTH_MS: i64 = 30 * DAY_MS;

/// Ban end in epoch milliseconds, or `None` for a permanent ban.
///
/// An unknown or missing unit letter falls back to a one-minute ban.
pub fn parse_ban_duration(text: &str, now_ms: i64) -> DashboardResult<Option<i64>> {
    let unit_ms = match text.chars().find(|c| c.is_ascii_alphabetic()) {
        Some('P') => return Ok(None),
        Some('m') => MINUTE_MS,
        Some('d') => DAY_MS,
        Some('M') => MONTH_MS,
        _ => return Ok(Some(now_ms.saturating_add(MINUTE_MS))),
    };

    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(invalid(text));
    }
    let amount: i64 = digits.parse().map_err(|_| invalid(text))?;

    amount
        .checked_mul(unit_ms)
        .and_then(|span| now_ms.checked_add(span))
        .map(Some)
        .ok_or_else(|| invalid(text))
}

fn invalid(text: &str) -> DashboardError {
    DashboardError::Validation(format!("Invalid ban duration: {}", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_units() {
        assert_eq!(parse_ban_duration("30m", NOW).unwrap(), Some(NOW + 30 * MINUTE_MS));
        assert_eq!(parse_ban_duration("2d", NOW).unwrap(), Some(NOW + 2 * DAY_MS));
        assert_eq!(parse_ban_duration("1M", NOW).unwrap(), Some(NOW + 30 * DAY_MS));
    }

    #[test]
    fn test_permanent() {
        assert_eq!(parse_ban_duration("0P", NOW).unwrap(), None);
        assert_eq!(parse_ban_duration("12P", NOW).unwrap(), None);
        assert_eq!(parse_ban_duration("P", NOW).unwrap(), None);
    }

    #[test]
    fn test_unknown_unit_is_one_minute() {
        assert_eq!(parse_ban_duration("5x", NOW).unwrap(), Some(NOW + MINUTE_MS));
        assert_eq!(parse_ban_duration("45", NOW).unwrap(), Some(NOW + MINUTE_MS));
        assert_eq!(parse_ban_duration("x", NOW).unwrap(), Some(NOW + MINUTE_MS));
        assert_eq!(
            parse_ban_duration("99999999999999999999x", NOW).unwrap(),
            Some(NOW + MINUTE_MS)
        );
    }

    #[test]
    fn test_rejects_missing_or_huge_numbers() {
        assert!(matches!(
            parse_ban_duration("d", NOW),
            Err(DashboardError::Validation(_))
        ));
        assert!(parse_ban_duration("99999999999999999999d", NOW).is_err());
        assert!(parse_ban_duration("999999999999999M", NOW).is_err());
    }
}
