//! Small text and number helpers shared by the subsystems

/// First `max_chars` characters of `text`, never splitting a UTF-8 sequence
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `part / whole` as a percentage, 0 when `whole` is 0
pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_multibyte() {
        assert_eq!(truncate_chars("₹5000 loan", 5), "₹5000");
        assert_eq!(truncate_chars("short", 50), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(3.8000000001, 2), 3.8);
        assert_eq!(round_to(1.23456, 3), 1.235);
    }

    #[test]
    fn test_percentage() {
        assert_eq!(percentage(3, 5), 60.0);
        assert_eq!(percentage(1, 0), 0.0);
    }
}
