//! Pairing PINs derived from the unit serial number

/// Hash seed
pub const PIN_SEED: u32 = 56_210;
/// Hash multiplier
pub const PIN_MULTIPLIER: u32 = 29;

/// Multiplicative hash of the serial's bytes, modulo 2^32
pub fn pin_hash(serial: &str) -> u32 {
    serial.bytes().fold(PIN_SEED, |h, c| {
        h.wrapping_mul(PIN_MULTIPLIER).wrapping_add(c as u32)
    })
}

/// Legacy 4-digit PIN
pub fn pin4(serial: &str) -> String {
    format!("{:04}", pin_hash(serial) % 10_000)
}

/// 6-digit passkey
pub fn pin6(serial: &str) -> String {
    format!("{:06}", pin_hash(serial) % 1_000_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_serial() {
        assert_eq!(pin_hash("A1509020010"), 3_891_465_317);
        assert_eq!(pin4("A1509020010"), "5317");
        assert_eq!(pin6("A1509020010"), "465317");
    }

    #[test]
    fn test_padding_and_digits() {
        assert_eq!(pin_hash(""), PIN_SEED);
        assert_eq!(pin4(""), "6210");
        assert_eq!(pin6(""), "056210");
        for serial in ["A1", "B1234567890", "zz"] {
            assert_eq!(pin4(serial).len(), 4);
            assert!(pin6(serial).ends_with(&pin4(serial)));
        }
    }
}
