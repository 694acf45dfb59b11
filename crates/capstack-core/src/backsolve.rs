//! Backsolve: infer an unobserved OPM input from an observed share price.
//!
//! Given the price actually paid per share for one security (usually the
//! latest preferred round), solve for the total equity value (or, with
//! equity value fixed, the implied volatility) at which the OPM allocation
//! reproduces that price.
//!
//! The model price is monotone but not analytically invertible, so the
//! solver brackets a sign change and closes in by bisection with secant
//! acceleration. Failure to converge is reported in the result, never
//! thrown: callers get the best estimate plus a status they can act on.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::breakpoints::BreakpointAnalysis;
use crate::error::CapstackError;
use crate::opm::{self, BlackScholesParams};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Years};
use crate::CapstackResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which input the solver varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SolveTarget {
    /// Solve for total equity value; volatility is a fixed input.
    #[default]
    EquityValue,
    /// Solve for implied volatility; equity value is a fixed input.
    Volatility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacksolveRequest {
    /// Security whose observed price anchors the solve.
    pub reference_security_id: String,
    pub observed_price_per_share: Money,
    #[serde(default)]
    pub target: SolveTarget,
    /// Required when solving for equity value.
    pub volatility: Option<Rate>,
    /// Required when solving for volatility.
    pub equity_value: Option<Money>,
    pub risk_free_rate: Rate,
    pub time_to_liquidity: Years,
    #[serde(default)]
    pub dividend_yield: Rate,
    /// Defaults to 100.
    pub max_iterations: Option<u32>,
    /// Relative price tolerance; defaults to 1e-6.
    pub tolerance: Option<Decimal>,
    /// Optional ceiling for the equity-value bracket.
    pub upper_bound: Option<Money>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    /// No sign change found; the observed price is unreachable within the
    /// search range.
    NotBracketed,
    IterationBudgetExhausted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacksolveOutput {
    /// Which input was solved for; the other carries the caller's value.
    pub target: SolveTarget,
    pub equity_value: Money,
    pub volatility: Rate,
    pub converged: bool,
    pub iterations: u32,
    pub status: SolveStatus,
    /// Model price per share at the returned solution.
    pub model_price: Money,
    /// `model_price - observed_price_per_share`.
    pub residual: Decimal,
}

const DEFAULT_MAX_ITERATIONS: u32 = 100;
const DEFAULT_TOLERANCE: Decimal = dec!(0.000001);

/// Volatility search grid. A security's model price need not be monotone
/// in volatility (preference tranches decay while upside tranches grow, so
/// the price can peak in the interior), so the bracket is found by walking
/// adjacent grid points for a residual sign change rather than assumed to
/// sit at the range ends.
const VOL_GRID: [Decimal; 18] = [
    dec!(0.0001),
    dec!(0.05),
    dec!(0.10),
    dec!(0.15),
    dec!(0.20),
    dec!(0.30),
    dec!(0.40),
    dec!(0.50),
    dec!(0.60),
    dec!(0.80),
    dec!(1.00),
    dec!(1.25),
    dec!(1.50),
    dec!(2.00),
    dec!(2.50),
    dec!(3.00),
    dec!(4.00),
    dec!(5.00),
];

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

pub fn backsolve(
    analysis: &BreakpointAnalysis,
    request: &BacksolveRequest,
) -> CapstackResult<ComputationOutput<BacksolveOutput>> {
    let start = Instant::now();
    validate_request(analysis, request)?;

    let max_iter = request.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
    let observed = request.observed_price_per_share;
    let tol_abs = request.tolerance.unwrap_or(DEFAULT_TOLERANCE) * observed;

    let price_at = |x: Decimal| -> CapstackResult<Decimal> {
        let params = match request.target {
            SolveTarget::EquityValue => BlackScholesParams {
                equity_value: x,
                volatility: request.volatility.unwrap_or_default(),
                risk_free_rate: request.risk_free_rate,
                time_to_liquidity: request.time_to_liquidity,
                dividend_yield: request.dividend_yield,
            },
            SolveTarget::Volatility => BlackScholesParams {
                equity_value: request.equity_value.unwrap_or_default(),
                volatility: x,
                risk_free_rate: request.risk_free_rate,
                time_to_liquidity: request.time_to_liquidity,
                dividend_yield: request.dividend_yield,
            },
        };
        let allocation = opm::allocate(analysis, &params)?;
        let security = allocation
            .securities
            .iter()
            .find(|s| s.security_id == request.reference_security_id)
            .ok_or_else(|| CapstackError::UnknownSecurity(request.reference_security_id.clone()))?;
        Ok(security.value_per_share)
    };
    let residual_at = |x: Decimal| -> CapstackResult<Decimal> { Ok(price_at(x)? - observed) };

    // ── Bracket a sign change ────────────────────────────────────────
    let (mut a, mut fa, mut b, mut fb) = match request.target {
        SolveTarget::EquityValue => {
            // Price per share grows without bound in equity value; double
            // the ceiling until the observed price sits inside the bracket.
            let total_shares: Decimal = analysis.securities.iter().map(|s| s.shares).sum();
            let a = dec!(0.000001);
            let fa = residual_at(a)?;
            let mut b = request
                .upper_bound
                .unwrap_or(observed * total_shares)
                .max(Decimal::ONE);
            let mut fb = residual_at(b)?;
            let mut doublings = 0;
            while fb < Decimal::ZERO && doublings < 64 {
                b *= dec!(2);
                fb = residual_at(b)?;
                doublings += 1;
            }
            (a, fa, b, fb)
        }
        SolveTarget::Volatility => {
            // Walk the grid and take the first sub-interval whose
            // residuals change sign, tracking the closest point seen in
            // case no bracket exists at all.
            let mut prev = VOL_GRID[0];
            let mut f_prev = residual_at(prev)?;
            let mut best = (prev, f_prev);
            let mut bracket = None;
            for &sigma in &VOL_GRID[1..] {
                let f = residual_at(sigma)?;
                if f.abs() < best.1.abs() {
                    best = (sigma, f);
                }
                if bracket.is_none() && (f_prev > Decimal::ZERO) != (f > Decimal::ZERO) {
                    bracket = Some((prev, f_prev, sigma, f));
                }
                prev = sigma;
                f_prev = f;
            }
            match bracket {
                Some(found) => found,
                None => {
                    let (x, fx) = best;
                    let status = if fx.abs() <= tol_abs {
                        SolveStatus::Converged
                    } else {
                        SolveStatus::NotBracketed
                    };
                    return Ok(finish(request, x, fx, observed, 0, status, start));
                }
            }
        }
    };

    if fa.abs() <= tol_abs {
        return Ok(finish(request, a, fa, observed, 0, SolveStatus::Converged, start));
    }
    if fb.abs() <= tol_abs {
        return Ok(finish(request, b, fb, observed, 0, SolveStatus::Converged, start));
    }
    if (fa > Decimal::ZERO) == (fb > Decimal::ZERO) {
        // Same sign at both ends: report the closer endpoint, unconverged.
        let (x, fx) = if fa.abs() <= fb.abs() { (a, fa) } else { (b, fb) };
        return Ok(finish(request, x, fx, observed, 0, SolveStatus::NotBracketed, start));
    }

    // ── Bisection with secant acceleration ──────────────────────────
    let two = dec!(2);
    for iteration in 1..=max_iter {
        let mid = (a + b) / two;
        let x = match (fb * (b - a)).checked_div(fb - fa) {
            Some(step) => {
                let secant = b - step;
                if secant > a && secant < b {
                    secant
                } else {
                    mid
                }
            }
            None => mid,
        };

        let fx = residual_at(x)?;
        if fx.abs() <= tol_abs {
            return Ok(finish(request, x, fx, observed, iteration, SolveStatus::Converged, start));
        }

        if (fx > Decimal::ZERO) == (fa > Decimal::ZERO) {
            a = x;
            fa = fx;
        } else {
            b = x;
            fb = fx;
        }
    }

    // Budget exhausted: hand back the bracket endpoint closest to the root.
    let (x, fx) = if fa.abs() <= fb.abs() { (a, fa) } else { (b, fb) };
    Ok(finish(
        request,
        x,
        fx,
        observed,
        max_iter,
        SolveStatus::IterationBudgetExhausted,
        start,
    ))
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn finish(
    request: &BacksolveRequest,
    x: Decimal,
    fx: Decimal,
    observed: Decimal,
    iterations: u32,
    status: SolveStatus,
    start: Instant,
) -> ComputationOutput<BacksolveOutput> {
    let (equity_value, volatility) = match request.target {
        SolveTarget::EquityValue => (x, request.volatility.unwrap_or_default()),
        SolveTarget::Volatility => (request.equity_value.unwrap_or_default(), x),
    };
    let converged = status == SolveStatus::Converged;

    let mut warnings = Vec::new();
    match status {
        SolveStatus::Converged => {}
        SolveStatus::NotBracketed => warnings.push(
            "observed price is unreachable within the search range; returning the closest endpoint"
                .to_string(),
        ),
        SolveStatus::IterationBudgetExhausted => warnings.push(format!(
            "iteration budget of {iterations} exhausted before reaching tolerance"
        )),
    }

    let elapsed = start.elapsed().as_micros() as u64;
    with_metadata(
        "Backsolve via bracketed bisection with secant acceleration over the OPM allocation",
        &serde_json::json!({
            "target": request.target,
            "reference_security_id": request.reference_security_id,
            "observed_price_per_share": observed.to_string(),
            "risk_free_rate": request.risk_free_rate.to_string(),
            "time_to_liquidity": request.time_to_liquidity.to_string(),
        }),
        warnings,
        elapsed,
        BacksolveOutput {
            target: request.target,
            equity_value,
            volatility,
            converged,
            iterations,
            status,
            model_price: observed + fx,
            residual: fx,
        },
    )
}

fn validate_request(
    analysis: &BreakpointAnalysis,
    request: &BacksolveRequest,
) -> CapstackResult<()> {
    opm::validate_analysis(analysis)?;

    if !analysis
        .securities
        .iter()
        .any(|s| s.security_id == request.reference_security_id)
    {
        return Err(CapstackError::UnknownSecurity(
            request.reference_security_id.clone(),
        ));
    }
    if request.observed_price_per_share <= Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "observed_price_per_share".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if request.time_to_liquidity < Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "time_to_liquidity".to_string(),
            reason: "cannot be negative".to_string(),
        });
    }
    if request.dividend_yield < Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "dividend_yield".to_string(),
            reason: "cannot be negative".to_string(),
        });
    }
    if let Some(tol) = request.tolerance {
        if tol <= Decimal::ZERO {
            return Err(CapstackError::InvalidInput {
                field: "tolerance".to_string(),
                reason: "must be positive".to_string(),
            });
        }
    }
    if request.max_iterations == Some(0) {
        return Err(CapstackError::InvalidInput {
            field: "max_iterations".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    match request.target {
        SolveTarget::EquityValue => match request.volatility {
            None => Err(CapstackError::InvalidInput {
                field: "volatility".to_string(),
                reason: "required when solving for equity value".to_string(),
            }),
            Some(v) if v < Decimal::ZERO => Err(CapstackError::InvalidInput {
                field: "volatility".to_string(),
                reason: "cannot be negative".to_string(),
            }),
            Some(_) => Ok(()),
        },
        SolveTarget::Volatility => match request.equity_value {
            None => Err(CapstackError::InvalidInput {
                field: "equity_value".to_string(),
                reason: "required when solving for volatility".to_string(),
            }),
            Some(e) if e <= Decimal::ZERO => Err(CapstackError::InvalidInput {
                field: "equity_value".to_string(),
                reason: "must be positive".to_string(),
            }),
            Some(_) => Ok(()),
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
