/// Parses duration labels used throughout the config (`90s`, `5m`, `15min`,
/// `2h`, `1hour`, `1d`) into whole seconds. A bare integer is taken as seconds.
pub fn parse_duration_seconds(value: &str) -> Result<i64, String> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return non_negative(seconds, value);
    }

    let (number_part, unit) = if let Some(stripped) = trimmed.strip_suffix("min") {
        (stripped, "min")
    } else if let Some(stripped) = trimmed.strip_suffix("hour") {
        (stripped, "hour")
    } else if let Some(stripped) = trimmed.strip_suffix("day") {
        (stripped, "day")
    } else {
        match trimmed.char_indices().next_back() {
            Some((idx, _)) => trimmed.split_at(idx),
            None => return Err("empty duration".to_string()),
        }
    };

    let multiplier = match unit {
        "s" => 1,
        "m" | "min" => 60,
        "h" | "hour" => 3600,
        "d" | "day" => 86400,
        _ => return Err(format!("unsupported duration unit in '{value}'")),
    };

    let number: i64 = number_part
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {value}"))?;
    let seconds = number
        .checked_mul(multiplier)
        .ok_or_else(|| format!("duration out of range: {value}"))?;
    non_negative(seconds, value)
}

/// Same grammar as [`parse_duration_seconds`], but the result must be a whole
/// number of minutes.
pub fn parse_duration_minutes(value: &str) -> Result<i64, String> {
    let seconds = parse_duration_seconds(value)?;
    if seconds % 60 != 0 {
        return Err(format!("duration must be a whole number of minutes: {value}"));
    }
    Ok(seconds / 60)
}

fn non_negative(seconds: i64, raw: &str) -> Result<i64, String> {
    if seconds < 0 {
        return Err(format!("duration must not be negative: {raw}"));
    }
    Ok(seconds)
}
