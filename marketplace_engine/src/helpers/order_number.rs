use chrono::Utc;
use rand::Rng;

use crate::db_types::OrderNumber;

/// Generates a human-readable order number of the form `ORD{6 time digits}{3 random digits}`.
///
/// The time component is the last six digits of the current unix epoch in milliseconds, so numbers are roughly
/// increasing within a window. The random suffix keeps simultaneous orders apart, but uniqueness is ultimately
/// enforced by the database; callers retry with a fresh number on a clash.
pub fn generate_order_number() -> OrderNumber {
    let millis = Utc::now().timestamp_millis();
    let time_part = (millis % 1_000_000).unsigned_abs();
    let random_part = rand::thread_rng().gen_range(0..1000u32);
    OrderNumber::from(format!("ORD{time_part:06}{random_part:03}"))
}

#[cfg(test)]
mod test {
    use super::generate_order_number;

    #[test]
    fn order_number_format() {
        let number = generate_order_number();
        let s = number.as_str();
        assert_eq!(s.len(), 12);
        assert!(s.starts_with("ORD"));
        assert!(s[3..].chars().all(|c| c.is_ascii_digit()));
    }
}
