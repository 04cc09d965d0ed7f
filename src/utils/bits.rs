// src/utils/bits.rs

//! Small integer helpers shared by the transform and the zerotree coder.

/// Largest power of two that is less than or equal to `n`; zero for zero.
#[inline]
pub fn le_power_of_2(n: u64) -> u64 {
    if n == 0 { 0 } else { 1u64 << (63 - n.leading_zeros()) }
}

/// Floor of log2(n). `log2(0)` is defined as 0.
#[inline]
pub fn log2(n: usize) -> usize {
    if n == 0 { 0 } else { (usize::BITS - 1 - n.leading_zeros()) as usize }
}

/// log2 of a power of two as a signed byte, -1 for zero.
#[inline]
pub fn log2_pow2(pow2: u64) -> i8 {
    if pow2 == 0 { -1 } else { pow2.trailing_zeros() as i8 }
}

#[inline]
pub fn is_power_of_2(n: usize) -> bool {
    n != 0 && n & (n - 1) == 0
}

/// True when `n` can be halved `level` times without a remainder.
#[inline]
pub fn is_divisible_by_2(n: usize, level: usize) -> bool {
    if level >= usize::BITS as usize {
        return n == 0;
    }
    n & ((1usize << level) - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_power_of_2() {
        assert_eq!(le_power_of_2(0), 0);
        assert_eq!(le_power_of_2(1), 1);
        assert_eq!(le_power_of_2(5), 4);
        assert_eq!(le_power_of_2(8), 8);
        assert_eq!(le_power_of_2(u64::MAX), 1 << 63);
    }

    #[test]
    fn test_log2_helpers() {
        assert_eq!(log2(1), 0);
        assert_eq!(log2(7), 2);
        assert_eq!(log2(1024), 10);
        assert_eq!(log2_pow2(0), -1);
        assert_eq!(log2_pow2(1), 0);
        assert_eq!(log2_pow2(1 << 40), 40);
    }

    #[test]
    fn test_divisibility() {
        assert!(is_power_of_2(64));
        assert!(!is_power_of_2(0));
        assert!(!is_power_of_2(12));
        assert!(is_divisible_by_2(12, 2));
        assert!(!is_divisible_by_2(12, 3));
        assert!(is_divisible_by_2(5, 0));
    }
}
