const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

/// Human-readable size with one decimal (`"1.5 MB"`); empty for zero.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return String::new();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::format_bytes;

    #[test]
    fn sizes_scale_by_1024() {
        assert_eq!(format_bytes(0), "");
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn largest_unit_is_terabytes() {
        assert_eq!(format_bytes(2048 * 1024 * 1024 * 1024 * 1024), "2048.0 TB");
    }
}
