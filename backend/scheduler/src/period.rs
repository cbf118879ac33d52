/// Rule time period parsing.
///
/// Accepts a bare number of seconds (`3600`) or a sequence of `<n><unit>`
/// pairs with units `w`, `d`, `h`, `m`, `s` (`1h30m`, `2d`, `90s`).
use anyhow::{anyhow, bail, Result};

fn unit_seconds(unit: char) -> Option<u64> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(3_600),
        'd' => Some(86_400),
        'w' => Some(604_800),
        _ => None,
    }
}

/// Parse a period into seconds. Zero-length periods are rejected.
pub fn parse_period(input: &str) -> Result<u64> {
    let input = input.trim().to_ascii_lowercase();
    if input.is_empty() {
        bail!("time period is empty");
    }

    if let Ok(secs) = input.parse::<u64>() {
        if secs == 0 {
            bail!("time period must be at least one second");
        }
        return Ok(secs);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let per = unit_seconds(c).ok_or_else(|| anyhow!("unknown time unit '{}' in '{}'", c, input))?;
        if digits.is_empty() {
            bail!("unit '{}' has no number in '{}'", c, input);
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| anyhow!("'{}' is not a number", digits))?;
        total = n
            .checked_mul(per)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| anyhow!("time period '{}' is too large", input))?;
        digits.clear();
    }
    if !digits.is_empty() {
        bail!("trailing number '{}' in '{}' has no unit", digits, input);
    }
    if total == 0 {
        bail!("time period must be at least one second");
    }
    Ok(total)
}
