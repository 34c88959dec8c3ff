//! Integer GCD/LCM used to size the schedule tape.

/// Greatest common divisor (Euclid). `gcd(0, b) == b`.
#[inline]
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Least common multiple, `None` on overflow. `lcm(0, b) == 0`.
#[inline]
pub fn checked_lcm(a: u64, b: u64) -> Option<u64> {
    if a == 0 || b == 0 {
        return Some(0);
    }
    (a / gcd(a, b)).checked_mul(b)
}

/// `value * num / den` without intermediate overflow. `den` must be nonzero.
#[inline]
pub fn mul_div(value: u64, num: u64, den: u64) -> u64 {
    (u128::from(value) * u128::from(num) / u128::from(den)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gcd_basics() {
        assert_eq!(gcd(1000, 700), 100);
        assert_eq!(gcd(700, 1000), 100);
        assert_eq!(gcd(0, 9), 9);
        assert_eq!(gcd(9, 0), 9);
        assert_eq!(gcd(17, 5), 1);
    }

    #[test]
    fn lcm_basics() {
        assert_eq!(checked_lcm(1000, 300), Some(3000));
        assert_eq!(checked_lcm(100, 70), Some(700));
        assert_eq!(checked_lcm(1, 1), Some(1));
        assert_eq!(checked_lcm(0, 5), Some(0));
    }

    #[test]
    fn lcm_overflow_is_none() {
        assert_eq!(checked_lcm(u64::MAX, u64::MAX - 1), None);
    }

    #[test]
    fn mul_div_keeps_precision() {
        assert_eq!(mul_div(u64::MAX, 2, 4), u64::MAX / 2);
        assert_eq!(mul_div(1234, 150, 100), 1851);
    }
}
