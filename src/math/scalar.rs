use std::cmp::Ordering;
use std::ops::{Add, Mul, Sub};

use num_rational::BigRational;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};

/// Outcome of a geometric predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Positive,
    Negative,
    /// Zero, or too close to zero to be decided in the current arithmetic.
    Degenerate,
}

impl Sign {
    /// Flips `Positive` and `Negative`.
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Positive => Self::Negative,
            Self::Negative => Self::Positive,
            Self::Degenerate => Self::Degenerate,
        }
    }

    #[must_use]
    pub fn is_degenerate(self) -> bool {
        self == Self::Degenerate
    }
}

/// Arithmetic backend for the geometric predicates.
///
/// `classify` decides the sign of a computed determinant. The `bound` argument
/// is the forward error bound of the floating-point evaluation; exact
/// backends ignore it.
pub trait Scalar:
    Clone + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self>
{
    fn from_f64(value: f64) -> Self;

    fn to_f64(&self) -> f64;

    fn classify(&self, bound: f64) -> Sign;

    fn compare(&self, other: &Self) -> Ordering;

    /// Division, used only by constructions (never by predicates).
    fn ratio(&self, denominator: &Self) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(&self) -> f64 {
        *self
    }

    fn classify(&self, bound: f64) -> Sign {
        if *self > bound {
            Sign::Positive
        } else if *self < -bound {
            Sign::Negative
        } else {
            Sign::Degenerate
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }

    fn ratio(&self, denominator: &Self) -> Self {
        self / denominator
    }
}

impl Scalar for BigRational {
    fn from_f64(value: f64) -> Self {
        // Non-finite input is rejected at registration.
        <BigRational as FromPrimitive>::from_f64(value).unwrap_or_else(BigRational::zero)
    }

    fn to_f64(&self) -> f64 {
        ToPrimitive::to_f64(self).unwrap_or(f64::NAN)
    }

    fn classify(&self, _bound: f64) -> Sign {
        if self.is_positive() {
            Sign::Positive
        } else if self.is_negative() {
            Sign::Negative
        } else {
            Sign::Degenerate
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn ratio(&self, denominator: &Self) -> Self {
        if denominator.is_zero() {
            BigRational::zero()
        } else {
            self / denominator
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_sign_respects_error_bound() {
        assert_eq!(Scalar::classify(&1e-3_f64, 1e-6), Sign::Positive);
        assert_eq!(Scalar::classify(&-1e-3_f64, 1e-6), Sign::Negative);
        assert_eq!(Scalar::classify(&1e-9_f64, 1e-6), Sign::Degenerate);
    }

    #[test]
    fn rational_is_exact() {
        let a = <BigRational as Scalar>::from_f64(0.1);
        let b = <BigRational as Scalar>::from_f64(0.2);
        let c = <BigRational as Scalar>::from_f64(0.3);
        // 0.1 + 0.2 != 0.3 in binary, and the exact backend sees that.
        let diff = a + b - c;
        assert_ne!(Scalar::classify(&diff, 0.0), Sign::Degenerate);
    }

    #[test]
    fn rational_zero_is_degenerate() {
        let a = <BigRational as Scalar>::from_f64(0.25);
        let diff = a.clone() - a;
        assert_eq!(Scalar::classify(&diff, 1.0), Sign::Degenerate);
    }

    #[test]
    fn negate_swaps_signs() {
        assert_eq!(Sign::Positive.negate(), Sign::Negative);
        assert_eq!(Sign::Degenerate.negate(), Sign::Degenerate);
    }
}
