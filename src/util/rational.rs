//! Rational number representation for frame rates and frame durations

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A rational number represented as numerator/denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    /// Create a new rational number
    pub fn new(num: i64, den: i64) -> Self {
        let mut r = Rational { num, den };
        r.reduce();
        r
    }

    /// True when the value is strictly positive and well formed
    pub fn is_positive(self) -> bool {
        self.den != 0 && self.num > 0 && self.den > 0
    }

    /// Duration of `frames` frames at this frame rate
    ///
    /// Returns `None` for a zero or negative rate, or when the result does
    /// not fit in a `Duration`.
    pub fn frames_to_duration(self, frames: u64) -> Option<Duration> {
        if !self.is_positive() {
            return None;
        }

        let nanos = (frames as u128)
            .checked_mul(1_000_000_000)?
            .checked_mul(self.den as u128)?
            / self.num as u128;

        u64::try_from(nanos).ok().map(Duration::from_nanos)
    }

    /// Reduce the fraction to lowest terms
    fn reduce(&mut self) {
        if self.den == 0 {
            return;
        }

        let gcd = Self::gcd(self.num.abs(), self.den.abs());
        if gcd > 1 {
            self.num /= gcd;
            self.den /= gcd;
        }

        // Keep denominator positive
        if self.den < 0 {
            self.num = -self.num;
            self.den = -self.den;
        }
    }

    /// Calculate greatest common divisor
    fn gcd(mut a: i64, mut b: i64) -> i64 {
        while b != 0 {
            let t = b;
            b = a % b;
            a = t;
        }
        a
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational { num: 0, den: 1 }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}
