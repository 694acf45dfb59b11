//! Decimal-precision elementary functions for the Black-Scholes machinery.
//!
//! Everything stays in `rust_decimal::Decimal`; no f64 round-trips. The
//! approximations here are accurate to well beyond the 1e-6 relative
//! tolerance the allocation and backsolve layers work to.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// exp(x) via Taylor series with range reduction.
///
/// For |x| > 2 the argument is halved recursively (exp(x) = exp(x/2)^2),
/// then a 25-term series is summed. Deeply negative arguments underflow
/// to zero, which is the behaviour the tail of N(d) needs.
pub fn exp(x: Decimal) -> Decimal {
    let two = dec!(2);

    if x > two || x < -two {
        let half = exp(x / two);
        return half * half;
    }

    let mut sum = Decimal::ONE;
    let mut term = Decimal::ONE;
    for n in 1u32..=25 {
        term = term * x / Decimal::from(n);
        sum += term;
    }
    sum
}

/// Square root by Newton iteration. Non-positive input returns zero.
pub fn sqrt(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    if x == Decimal::ONE {
        return Decimal::ONE;
    }
    let two = dec!(2);
    let mut guess = x / two;
    if x > dec!(100) {
        guess = dec!(10);
    } else if x < dec!(0.01) {
        guess = dec!(0.1);
    }
    for _ in 0..25 {
        guess = (guess + x / guess) / two;
    }
    guess
}

/// Natural logarithm: solve exp(y) = x by Newton's method.
///
/// Non-positive input returns a large negative sentinel; callers guard the
/// domain before calling.
pub fn ln(x: Decimal) -> Decimal {
    if x <= Decimal::ZERO {
        return dec!(-999);
    }
    if x == Decimal::ONE {
        return Decimal::ZERO;
    }

    // Initial guess: x - 1 near one, otherwise count factors of e
    let mut y = if x > dec!(0.5) && x < dec!(2) {
        x - Decimal::ONE
    } else {
        let mut approx = Decimal::ZERO;
        let mut v = x;
        let e_approx = dec!(2.718281828459045);
        if x > Decimal::ONE {
            while v > e_approx {
                v /= e_approx;
                approx += Decimal::ONE;
            }
            approx + (v - Decimal::ONE)
        } else {
            while v < Decimal::ONE / e_approx {
                v *= e_approx;
                approx -= Decimal::ONE;
            }
            approx + (v - Decimal::ONE)
        }
    };

    // y_{n+1} = y_n - 1 + x / exp(y_n)
    for _ in 0..30 {
        let ey = exp(y);
        if ey == Decimal::ZERO {
            break;
        }
        y = y - Decimal::ONE + x / ey;
    }
    y
}

/// Standard normal density phi(x) = exp(-x^2/2) / sqrt(2*pi)
pub fn norm_pdf(x: Decimal) -> Decimal {
    let two_pi = dec!(6.283185307179586);
    let exponent = -(x * x) / dec!(2);
    exp(exponent) / sqrt(two_pi)
}

/// Standard normal CDF, Abramowitz & Stegun 26.2.17.
///
/// t = 1 / (1 + 0.2316419 |x|), polynomial in Horner form, reflected for
/// negative arguments. Absolute error below 7.5e-8 across the real line.
pub fn norm_cdf(x: Decimal) -> Decimal {
    let b1 = dec!(0.319381530);
    let b2 = dec!(-0.356563782);
    let b3 = dec!(1.781477937);
    let b4 = dec!(-1.821255978);
    let b5 = dec!(1.330274429);
    let p = dec!(0.2316419);

    let abs_x = if x < Decimal::ZERO { -x } else { x };
    let t = Decimal::ONE / (Decimal::ONE + p * abs_x);

    let poly = t * (b1 + t * (b2 + t * (b3 + t * (b4 + t * b5))));

    let cdf_pos = Decimal::ONE - norm_pdf(abs_x) * poly;

    if x < Decimal::ZERO {
        Decimal::ONE - cdf_pos
    } else {
        cdf_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Decimal, b: Decimal, tol: Decimal) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_exp_known_values() {
        assert!(approx_eq(exp(Decimal::ZERO), Decimal::ONE, dec!(0.0000001)));
        assert!(approx_eq(exp(Decimal::ONE), dec!(2.718281828), dec!(0.000001)));
        assert!(approx_eq(exp(dec!(-1)), dec!(0.367879441), dec!(0.000001)));
    }

    #[test]
    fn test_exp_large_negative_underflows_to_zero() {
        assert_eq!(exp(dec!(-200)), Decimal::ZERO);
    }

    #[test]
    fn test_sqrt_known_values() {
        assert!(approx_eq(sqrt(dec!(4)), dec!(2), dec!(0.0000001)));
        assert!(approx_eq(sqrt(dec!(2)), dec!(1.414213562), dec!(0.000001)));
        assert_eq!(sqrt(Decimal::ZERO), Decimal::ZERO);
        assert_eq!(sqrt(dec!(-3)), Decimal::ZERO);
    }

    #[test]
    fn test_ln_known_values() {
        assert_eq!(ln(Decimal::ONE), Decimal::ZERO);
        assert!(approx_eq(ln(dec!(2.718281828459045)), Decimal::ONE, dec!(0.000001)));
        assert!(approx_eq(ln(dec!(10)), dec!(2.302585093), dec!(0.000001)));
        // Large ratios show up as S/K for deep-in-the-money tranches
        assert!(approx_eq(ln(dec!(1000000)), dec!(13.815510558), dec!(0.00001)));
    }

    #[test]
    fn test_ln_exp_roundtrip() {
        for v in [dec!(0.25), dec!(0.9), dec!(1.5), dec!(7), dec!(42)] {
            assert!(approx_eq(exp(ln(v)), v, dec!(0.000001) * v));
        }
    }

    #[test]
    fn test_norm_cdf_symmetry_and_bounds() {
        assert!(approx_eq(norm_cdf(Decimal::ZERO), dec!(0.5), dec!(0.0000001)));
        assert!(approx_eq(
            norm_cdf(dec!(1.96)) + norm_cdf(dec!(-1.96)),
            Decimal::ONE,
            dec!(0.0000001)
        ));
        assert!(norm_cdf(dec!(6)) > dec!(0.999999));
        assert!(norm_cdf(dec!(-6)) < dec!(0.000001));
    }

    #[test]
    fn test_norm_cdf_reference_point() {
        // N(1) = 0.841344746...
        assert!(approx_eq(norm_cdf(Decimal::ONE), dec!(0.8413447), dec!(0.0000005)));
    }
}
