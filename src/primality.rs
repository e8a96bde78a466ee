use crate::shared_types::{Interval, PrimeCount};

/// Trial division over odd divisors. The square is taken in `u128` so that
/// `d * d` cannot overflow near `u64::MAX`.
pub(crate) fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    let mut d: u64 = 3;
    while (d as u128) * (d as u128) <= n as u128 {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

/// Counts primes in the inclusive range. This is the per-worker job.
pub(crate) fn count_range(range: Interval) -> PrimeCount {
    if range.is_empty() {
        return 0;
    }
    (range.start..=range.end).filter(|&n| is_prime(n)).count() as PrimeCount
}

/// Counts primes in `[2, limit]`, crediting 2 up front and then scanning odd
/// candidates only.
pub(crate) fn count_up_to(limit: u64) -> PrimeCount {
    if limit < 2 {
        return 0;
    }
    1 + (3..=limit).step_by(2).filter(|&n| is_prime(n)).count() as PrimeCount
}
