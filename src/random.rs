//! Random fixtures for tests and the demo binary

use rand::Rng;
use rust_decimal::Decimal;

use crate::money::{Currency, MONEY_SCALE};

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Random integer in `[min, max)`; `None` for an empty range
pub fn random_int(min: i64, max: i64) -> Option<i64> {
    if min >= max {
        return None;
    }
    Some(rand::thread_rng().gen_range(min..max))
}

pub fn random_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Six-letter account owner
pub fn random_owner() -> String {
    random_string(6)
}

/// Amount in `[100.00, 1000.00)` with cents
pub fn random_money() -> Decimal {
    let cents = random_int(10_000, 100_000).unwrap_or(10_000);
    Decimal::new(cents, MONEY_SCALE)
}

pub fn random_currency() -> Currency {
    Currency::ALL[rand::thread_rng().gen_range(0..Currency::ALL.len())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_int_range() {
        assert_eq!(random_int(5, 5), None);
        assert_eq!(random_int(6, 5), None);
        for _ in 0..100 {
            let n = random_int(-3, 3).unwrap();
            assert!((-3..3).contains(&n));
        }
    }

    #[test]
    fn test_random_owner() {
        let owner = random_owner();
        assert_eq!(owner.len(), 6);
        assert!(owner.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_random_money_is_valid_amount() {
        for _ in 0..100 {
            let money = random_money();
            assert!(money >= Decimal::from(100) && money < Decimal::from(1000));
            assert!(crate::money::validate_amount(money).is_ok());
        }
    }

    #[test]
    fn test_random_currency_supported() {
        for _ in 0..20 {
            assert!(crate::money::is_supported_currency(random_currency().code()));
        }
    }
}
