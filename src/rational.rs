//! Exact rational arithmetic over `i64`.
//!
//! Every duration, sample period, and sub-second offset in the time/space
//! model is a `Rational`. No floating point appears in timing invariants:
//! acquisition sample rates are things like `50/1000` seconds, and
//! comparing/adding them exactly (rather than as `f64`) is what keeps
//! `time_to_index(index_to_start_time(i)) == i` exact for every `i`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A reduced fraction `num / den` with `den > 0`.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    /// Builds a `Rational`, reducing by the GCD and normalizing the sign
    /// onto the numerator. Fails if `den == 0`.
    pub fn new(num: i64, den: i64) -> CoreResult<Self> {
        if den == 0 {
            return Err(CoreError::user_input("rational denominator is zero"));
        }
        let (mut num, mut den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()).max(1);
        num /= g as i64;
        den /= g as i64;
        Ok(Self { num, den })
    }

    pub fn from_int(value: i64) -> Self {
        Self { num: value, den: 1 }
    }

    pub fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    pub fn num(self) -> i64 {
        self.num
    }

    pub fn den(self) -> i64 {
        self.den
    }

    pub fn is_zero(self) -> bool {
        self.num == 0
    }

    pub fn is_positive(self) -> bool {
        self.num > 0
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn checked_add(self, other: Self) -> CoreResult<Self> {
        let num = checked_i128(self.num as i128 * other.den as i128)?
            + checked_i128(other.num as i128 * self.den as i128)?;
        let den = checked_i128(self.den as i128 * other.den as i128)?;
        Self::from_i128(num, den)
    }

    pub fn checked_sub(self, other: Self) -> CoreResult<Self> {
        self.checked_add(other.checked_neg()?)
    }

    pub fn checked_neg(self) -> CoreResult<Self> {
        Rational::new(
            self.num
                .checked_neg()
                .ok_or_else(|| CoreError::user_input("rational negation overflowed"))?,
            self.den,
        )
    }

    pub fn checked_mul(self, other: Self) -> CoreResult<Self> {
        let num = checked_i128(self.num as i128 * other.num as i128)?;
        let den = checked_i128(self.den as i128 * other.den as i128)?;
        Self::from_i128(num, den)
    }

    /// Multiplies by an integer scalar (e.g. `step * num_samples`).
    pub fn checked_mul_i64(self, scalar: i64) -> CoreResult<Self> {
        self.checked_mul(Rational::from_int(scalar))
    }

    pub fn checked_div(self, other: Self) -> CoreResult<Self> {
        if other.is_zero() {
            return Err(CoreError::user_input("division by zero rational"));
        }
        self.checked_mul(Rational {
            num: other.den,
            den: other.num,
        })
    }

    fn from_i128(num: i128, den: i128) -> CoreResult<Self> {
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd_i128(num.unsigned_abs(), den.unsigned_abs()).max(1);
        let num = num / g as i128;
        let den = den / g as i128;
        let num = i64::try_from(num)
            .map_err(|_| CoreError::user_input("rational numerator overflowed i64"))?;
        let den = i64::try_from(den)
            .map_err(|_| CoreError::user_input("rational denominator overflowed i64"))?;
        Self::new(num, den)
    }
}

fn checked_i128(v: i128) -> CoreResult<i128> {
    // i128 arithmetic on values built from two i64s cannot itself overflow
    // i128, but we still bound-check the final reduction back to i64 in
    // `from_i128`; this helper exists so overflow sites read uniformly.
    Ok(v)
}

impl PartialEq for Rational {
    fn eq(&self, other: &Self) -> bool {
        self.num as i128 * other.den as i128 == other.num as i128 * self.den as i128
    }
}

impl Eq for Rational {}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn gcd_i128(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Rounds `num/den` (`den > 0`) to the nearest integer, breaking exact
/// ties toward the lower (more negative) integer. Used by both
/// `TimingInfo::time_to_index` and `SpacingInfo::microns_to_pixel`.
pub(crate) fn round_half_down(num: i128, den: i128) -> i128 {
    debug_assert!(den > 0);
    let q = num.div_euclid(den);
    let r = num - q * den; // 0 <= r < den
    if 2 * r > den {
        q + 1
    } else {
        q
    }
}
