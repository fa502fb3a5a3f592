//! Presentation helpers. Values stay in meters and whole seconds internally.

/// `MM:SS`, minutes unbounded.
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Kilometers with two decimals.
pub fn format_distance_km(meters: f64) -> String {
    format!("{:.2}", meters / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_zero_padded() {
        assert_eq!(format_elapsed(0), "00:00");
        assert_eq!(format_elapsed(125), "02:05");
        assert_eq!(format_elapsed(3725), "62:05");
    }

    #[test]
    fn distance_in_km() {
        assert_eq!(format_distance_km(0.0), "0.00");
        assert_eq!(format_distance_km(111.19), "0.11");
        assert_eq!(format_distance_km(2500.0), "2.50");
    }
}
