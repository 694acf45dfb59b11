//! Option-pricing-model allocation of equity value across breakpoints.
//!
//! Each breakpoint interval is valued as a Black-Scholes call spread: the
//! tranche worth is the call struck at the interval's lower bound minus the
//! call struck at its upper bound, with the unbounded tail worth exactly the
//! lower-bound call. The strike-zero call is the full distributable value,
//! so the tranche values telescope and the allocated total matches the
//! distributable value up to rounding.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::breakpoints::{BreakpointAnalysis, BreakpointKind};
use crate::error::CapstackError;
use crate::math::{exp, ln, norm_cdf, sqrt};
use crate::types::{with_metadata, ComputationOutput, Money, Rate, Years};
use crate::CapstackResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Black-Scholes inputs for the allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackScholesParams {
    /// Total equity value being allocated.
    pub equity_value: Money,
    /// Annualized volatility of equity value (0.60 = 60%).
    pub volatility: Rate,
    /// Continuously compounded risk-free rate.
    pub risk_free_rate: Rate,
    /// Years until the expected liquidity event.
    pub time_to_liquidity: Years,
    /// Continuous dividend yield on equity value. Rarely non-zero for
    /// private companies.
    #[serde(default)]
    pub dividend_yield: Rate,
}

/// Value assigned to one breakpoint interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrancheValue {
    pub from_value: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_value: Option<Money>,
    pub kind: BreakpointKind,
    pub value: Money,
}

/// Value assigned to one security across all intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityValue {
    pub security_id: String,
    pub name: String,
    pub total_value: Money,
    pub shares: Decimal,
    pub value_per_share: Money,
}

/// Allocated total against the distributable value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConservationCheck {
    pub allocated_total: Money,
    pub equity_value: Money,
    pub relative_error: Decimal,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutput {
    pub securities: Vec<SecurityValue>,
    pub tranches: Vec<TrancheValue>,
    pub conservation: ConservationCheck,
    /// True when volatility or time is zero and tranches were valued at
    /// discounted intrinsic value instead of Black-Scholes.
    pub intrinsic_fallback: bool,
}

/// Relative tolerance for the conservation check.
const CONSERVATION_TOL: Decimal = dec!(0.000001);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Allocate equity value across the breakpoint structure and divide each
/// security's allocation into per-share terms.
pub fn value_securities(
    analysis: &BreakpointAnalysis,
    params: &BlackScholesParams,
) -> CapstackResult<ComputationOutput<AllocationOutput>> {
    let start = Instant::now();
    validate_params(params)?;
    validate_analysis(analysis)?;

    let output = allocate(analysis, params)?;

    let mut warnings: Vec<String> = Vec::new();
    if output.intrinsic_fallback {
        warnings.push(
            "volatility or time to liquidity is zero; tranches valued at discounted intrinsic value"
                .to_string(),
        );
    }
    if params.dividend_yield > Decimal::ZERO {
        warnings.push(
            "non-zero dividend yield: allocated total is net of dividend leakage".to_string(),
        );
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Option pricing model (Black-Scholes call spreads over waterfall breakpoints)",
        &serde_json::json!({
            "equity_value": params.equity_value.to_string(),
            "volatility": params.volatility.to_string(),
            "risk_free_rate": params.risk_free_rate.to_string(),
            "time_to_liquidity": params.time_to_liquidity.to_string(),
            "dividend_yield": params.dividend_yield.to_string(),
            "intervals": analysis.breakpoints.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Core allocation, shared with the backsolve solver. Callers are expected
/// to have validated inputs.
pub(crate) fn allocate(
    analysis: &BreakpointAnalysis,
    params: &BlackScholesParams,
) -> CapstackResult<AllocationOutput> {
    let distributable = call_value(Decimal::ZERO, params);
    let neg_tol = params.equity_value * dec!(0.000000001);

    let mut tranches: Vec<TrancheValue> = Vec::with_capacity(analysis.breakpoints.len());
    let mut totals: HashMap<&str, Decimal> = HashMap::new();

    for bp in &analysis.breakpoints {
        let lower = call_value(bp.from_value, params);
        let upper = match bp.to_value {
            Some(to) => call_value(to, params),
            None => Decimal::ZERO,
        };
        let mut value = lower - upper;
        if value < Decimal::ZERO {
            if value < -neg_tol {
                return Err(CapstackError::NegativeTranche {
                    from_value: bp.from_value,
                    value,
                });
            }
            value = Decimal::ZERO;
        }

        for slice in &bp.participants {
            let share = value * slice.percentage / dec!(100);
            *totals.entry(slice.security_id.as_str()).or_default() += share;
        }

        tranches.push(TrancheValue {
            from_value: bp.from_value,
            to_value: bp.to_value,
            kind: bp.kind,
            value,
        });
    }

    let mut securities: Vec<SecurityValue> = Vec::with_capacity(analysis.securities.len());
    for stake in &analysis.securities {
        let total = totals
            .get(stake.security_id.as_str())
            .copied()
            .unwrap_or(Decimal::ZERO);
        let per_share = if stake.shares > Decimal::ZERO {
            total / stake.shares
        } else {
            Decimal::ZERO
        };
        securities.push(SecurityValue {
            security_id: stake.security_id.clone(),
            name: stake.name.clone(),
            total_value: total,
            shares: stake.shares,
            value_per_share: per_share,
        });
    }

    let allocated_total: Decimal = securities.iter().map(|s| s.total_value).sum();
    let relative_error = if distributable > Decimal::ZERO {
        ((allocated_total - distributable) / distributable).abs()
    } else {
        allocated_total.abs()
    };
    let within_tolerance = relative_error <= CONSERVATION_TOL;
    debug_assert!(
        within_tolerance,
        "allocation lost value: {allocated_total} of {distributable}"
    );

    let intrinsic_fallback =
        params.volatility <= Decimal::ZERO || params.time_to_liquidity <= Decimal::ZERO;

    Ok(AllocationOutput {
        securities,
        tranches,
        conservation: ConservationCheck {
            allocated_total,
            equity_value: distributable,
            relative_error,
            within_tolerance,
        },
        intrinsic_fallback,
    })
}

// ---------------------------------------------------------------------------
// Black-Scholes
// ---------------------------------------------------------------------------

/// European call on the equity value struck at `strike`.
///
/// At strike zero this is the distributable value `S * exp(-qT)`; when
/// volatility or time is zero the call collapses to discounted intrinsic
/// value.
pub(crate) fn call_value(strike: Money, params: &BlackScholesParams) -> Money {
    let s = params.equity_value;
    let t = params.time_to_liquidity.max(Decimal::ZERO);
    let q_disc = exp(-params.dividend_yield * t);
    let r_disc = exp(-params.risk_free_rate * t);

    if strike <= Decimal::ZERO {
        return s * q_disc;
    }
    if params.volatility <= Decimal::ZERO || t <= Decimal::ZERO {
        return (s * q_disc - strike * r_disc).max(Decimal::ZERO);
    }

    let sigma = params.volatility;
    let sqrt_t = sqrt(t);
    let sigma_sqrt_t = sigma * sqrt_t;
    let drift = params.risk_free_rate - params.dividend_yield + sigma * sigma / dec!(2);
    let d1 = (ln(s / strike) + drift * t) / sigma_sqrt_t;
    let d2 = d1 - sigma_sqrt_t;

    (s * q_disc * norm_cdf(d1) - strike * r_disc * norm_cdf(d2)).max(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_params(params: &BlackScholesParams) -> CapstackResult<()> {
    if params.equity_value <= Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "equity_value".to_string(),
            reason: "must be positive".to_string(),
        });
    }
    if params.volatility < Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "volatility".to_string(),
            reason: "cannot be negative".to_string(),
        });
    }
    if params.time_to_liquidity < Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "time_to_liquidity".to_string(),
            reason: "cannot be negative".to_string(),
        });
    }
    if params.dividend_yield < Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "dividend_yield".to_string(),
            reason: "cannot be negative".to_string(),
        });
    }
    Ok(())
}

/// Structural checks on a breakpoint analysis supplied from outside (file,
/// stdin, bindings). Output of `compute_breakpoints` satisfies these by
/// construction.
pub(crate) fn validate_analysis(analysis: &BreakpointAnalysis) -> CapstackResult<()> {
    let bps = &analysis.breakpoints;
    if bps.is_empty() {
        return Err(CapstackError::InvalidInput {
            field: "breakpoints".to_string(),
            reason: "at least one interval is required".to_string(),
        });
    }
    if bps[0].from_value != Decimal::ZERO {
        return Err(CapstackError::InvalidInput {
            field: "breakpoints".to_string(),
            reason: "first interval must start at zero".to_string(),
        });
    }
    for (i, bp) in bps.iter().enumerate() {
        let last = i == bps.len() - 1;
        match bp.to_value {
            None if !last => {
                return Err(CapstackError::InvalidInput {
                    field: "breakpoints".to_string(),
                    reason: format!("interval {i} is unbounded but not last"),
                });
            }
            Some(to) if last => {
                return Err(CapstackError::InvalidInput {
                    field: "breakpoints".to_string(),
                    reason: format!("last interval must be unbounded, found upper bound {to}"),
                });
            }
            Some(to) => {
                if to <= bp.from_value {
                    return Err(CapstackError::InvalidInput {
                        field: "breakpoints".to_string(),
                        reason: format!("interval {i} is empty or inverted"),
                    });
                }
                if bps[i + 1].from_value != to {
                    return Err(CapstackError::InvalidInput {
                        field: "breakpoints".to_string(),
                        reason: format!("gap between interval {i} and {}", i + 1),
                    });
                }
            }
            None => {}
        }

        let total: Decimal = bp.participants.iter().map(|p| p.percentage).sum();
        if (total - dec!(100)).abs() > dec!(0.0000001) {
            return Err(CapstackError::InvalidInput {
                field: "breakpoints".to_string(),
                reason: format!("participation percentages in interval {i} sum to {total}"),
            });
        }
        for slice in &bp.participants {
            if !analysis
                .securities
                .iter()
                .any(|s| s.security_id == slice.security_id)
            {
                return Err(CapstackError::UnknownSecurity(slice.security_id.clone()));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
