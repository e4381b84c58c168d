//! # CRC-8 Checksum
//!
//! Frame integrity check: polynomial `0x31`, initial value `0x00`, MSB-first,
//! no input/output reflection and no final XOR.

/// Generator polynomial (x^8 + x^5 + x^4 + 1).
pub const POLYNOMIAL: u8 = 0x31;

/// Computes the CRC-8 of `data`.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_value_matches_reference() {
        assert_eq!(crc8(b"123456789"), 0xA2);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc8(&[]), 0x00);
    }

    #[test]
    fn single_bytes() {
        assert_eq!(crc8(&[0x01]), 0x31);
        assert_eq!(crc8(&[0xFF]), 0xAC);
    }
}
