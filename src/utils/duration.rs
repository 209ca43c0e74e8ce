use anyhow::{anyhow, Result};
use std::time::Duration;

/// Parse `500ms`, `30s`, `5m` or `2h`. A bare number is taken as seconds.
pub fn parse_duration(duration: &str) -> Result<Duration> {
    let duration_lower = duration.trim().to_lowercase();
    let parse = |digits: &str| -> Result<u64> {
        digits
            .parse()
            .map_err(|_| anyhow!("Invalid duration format: {}", duration))
    };
    let scaled = |digits: &str, factor: u64| -> Result<Duration> {
        parse(digits)?
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| anyhow!("Invalid duration: {} is too large", duration))
    };

    if let Some(millis) = duration_lower.strip_suffix("ms") {
        Ok(Duration::from_millis(parse(millis)?))
    } else if let Some(secs) = duration_lower.strip_suffix('s') {
        Ok(Duration::from_secs(parse(secs)?))
    } else if let Some(mins) = duration_lower.strip_suffix('m') {
        scaled(mins, 60)
    } else if let Some(hours) = duration_lower.strip_suffix('h') {
        scaled(hours, 3600)
    } else {
        Ok(Duration::from_secs(parse(&duration_lower)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("250ms", Duration::from_millis(250))]
    #[case("30s", Duration::from_secs(30))]
    #[case("5M", Duration::from_secs(300))]
    #[case("2h", Duration::from_secs(7200))]
    #[case("45", Duration::from_secs(45))]
    fn test_parse_duration(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("fast")]
    #[case("-1s")]
    #[case("1.5m")]
    #[case("99999999999999999999s")]
    fn test_rejects_garbage(#[case] input: &str) {
        assert!(parse_duration(input).is_err());
    }

    #[rstest]
    #[case("99999999999999999h")]
    #[case("999999999999999999m")]
    fn test_rejects_overflow(#[case] input: &str) {
        let err = parse_duration(input).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
