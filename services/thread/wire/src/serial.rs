//! Serial-number arithmetic (RFC 1982) for version and sequence fields.
//!
//! Exactly half of the number space counts as "ahead": `a` is greater than
//! `b` when it leads by 1..=127 (for 8-bit values). A distance of exactly
//! 128 is never greater in either direction.

/// Returns true when `a` is serially greater than `b` in 8-bit space.
pub fn is_greater_u8(a: u8, b: u8) -> bool {
    (a < b && b - a > 128) || (a > b && a - b < 128)
}

/// Returns true when `a` is serially greater than `b` in 16-bit space.
pub fn is_greater_u16(a: u16, b: u16) -> bool {
    (a < b && b - a > 0x8000) || (a > b && a - b < 0x8000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greater_u8_basic() {
        assert!(is_greater_u8(1, 0));
        assert!(!is_greater_u8(0, 1));
        assert!(is_greater_u8(127, 0));
    }

    #[test]
    fn test_greater_u8_wraps() {
        assert!(is_greater_u8(0, 255));
        assert!(is_greater_u8(5, 250));
        assert!(!is_greater_u8(250, 5));
    }

    #[test]
    fn test_greater_u8_half_range_is_not_greater() {
        assert!(!is_greater_u8(128, 0));
        assert!(!is_greater_u8(0, 128));
        assert!(!is_greater_u8(200, 72));
    }

    #[test]
    fn test_greater_u8_irreflexive() {
        for x in 0..=255u8 {
            assert!(!is_greater_u8(x, x));
        }
    }

    #[test]
    fn test_greater_u16() {
        assert!(is_greater_u16(1, 0));
        assert!(is_greater_u16(0, 0xffff));
        assert!(!is_greater_u16(0x8000, 0));
        assert!(!is_greater_u16(7, 7));
    }
}
