// utils/code_generator.rs
use rand::Rng;

/// 4-digit code the customer reads out to the hustler at handoff.
pub fn generate_start_code() -> String {
    generate_numeric_code(4)
}

/// 6-digit code the hustler shows the customer when the work is done.
pub fn generate_completion_code() -> String {
    generate_numeric_code(6)
}

/// Uniform random numeric string of fixed width. Leading zeros allowed.
pub fn generate_numeric_code(width: usize) -> String {
    let mut rng = rand::rng();
    (0..width)
        .map(|_| (b'0' + rng.random_range(0..10u8)) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_widths() {
        assert_eq!(generate_start_code().len(), 4);
        assert_eq!(generate_completion_code().len(), 6);
    }

    #[test]
    fn test_codes_are_numeric() {
        for _ in 0..50 {
            assert!(generate_numeric_code(6).chars().all(|c| c.is_ascii_digit()));
        }
    }
}
