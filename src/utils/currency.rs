/// Currency utility functions for dollar amounts.
///
/// Business logic works in dollars; every gateway call crosses the boundary
/// in integer cents to avoid floating-point drift on the wire.

/// Round a dollar amount to 2 decimal places, half-up.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Convert dollars to cents (multiply by 100)
pub fn dollars_to_cents(dollars: f64) -> i64 {
    (dollars * 100.0).round() as i64
}

/// Convert cents to dollars (divide by 100)
pub fn cents_to_dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Format cents as a dollar string with 2 decimal places
pub fn format_cents_as_dollars(cents: i64) -> String {
    format!("${:.2}", cents_to_dollars(cents))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.005), 12.01);
        assert_eq!(round2(6.4999), 6.5);
        assert_eq!(round2(88.0), 88.0);
    }

    #[test]
    fn test_dollars_to_cents() {
        assert_eq!(dollars_to_cents(100.0), 10000);
        assert_eq!(dollars_to_cents(0.50), 50);
        assert_eq!(dollars_to_cents(106.50), 10650);
    }

    #[test]
    fn test_cents_to_dollars() {
        assert_eq!(cents_to_dollars(10000), 100.0);
        assert_eq!(cents_to_dollars(50), 0.50);
        assert_eq!(cents_to_dollars(12345), 123.45);
    }

    #[test]
    fn test_format_cents_as_dollars() {
        assert_eq!(format_cents_as_dollars(10650), "$106.50");
        assert_eq!(format_cents_as_dollars(50), "$0.50");
    }
}
