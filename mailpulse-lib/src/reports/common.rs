/// Format a count with `,` thousands separators.
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result
}

/// Format a storage figure given in GiB.
pub fn format_storage(gib: f64) -> String {
    format!("{gib:.2} GiB")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn test_format_storage() {
        assert_eq!(format_storage(0.0), "0.00 GiB");
        assert_eq!(format_storage(1.5), "1.50 GiB");
    }
}
