//! Byte size parsing and formatting for the command line.

/// Parses `5000000`, `500K`, `5M`, `5MB`, `5MiB`, `1.5G`. Suffixes are binary (1024).
pub fn parse_size(input: &str) -> Result<u64, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let multiplier: u64 = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size suffix: {:?}", other)),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid size: {:?}", input))?;
    let bytes = (value * multiplier as f64).round();
    if !bytes.is_finite() || bytes < 1.0 {
        return Err("size must be at least one byte".to_string());
    }
    if bytes >= u64::MAX as f64 {
        return Err(format!("size too large: {:?}", input));
    }
    Ok(bytes as u64)
}

/// Formats a byte count with a binary unit, e.g. `4.77 MiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_bytes() {
        assert_eq!(parse_size("5000000").unwrap(), 5_000_000);
        assert_eq!(parse_size(" 42B ").unwrap(), 42);
    }

    #[test]
    fn test_parse_binary_suffixes() {
        assert_eq!(parse_size("500K").unwrap(), 500 * 1024);
        assert_eq!(parse_size("10M").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("10mb").unwrap(), 10 * 1024 * 1024);
        assert_eq!(parse_size("2MiB").unwrap(), 2 * 1024 * 1024);
        assert_eq!(parse_size("1.5G").unwrap(), 1536 * 1024 * 1024);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_size("").is_err());
        assert!(parse_size("0").is_err());
        assert!(parse_size("abc").is_err());
        assert!(parse_size("5T").is_err());
        assert!(parse_size("1.2.3M").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(5_000_000), "4.77 MiB");
        assert_eq!(format_size(2048), "2.00 KiB");
    }
}
