use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use rust_decimal::Decimal;
use serde_json::Value;

use capstack_core::backsolve::{self, BacksolveRequest, SolveTarget};
use capstack_core::breakpoints;
use capstack_core::captable::CapTable;
use capstack_core::opm::{self, BlackScholesParams};
use capstack_core::types::year_fraction;

use crate::input;

/// Arguments for breakpoint derivation
#[derive(Args)]
pub struct BreakpointsArgs {
    /// Path to a cap table file (.json or .yaml)
    #[arg(long)]
    pub input: Option<String>,
}

/// Arguments for OPM allocation
#[derive(Args)]
pub struct AllocateArgs {
    /// Path to a cap table file (.json or .yaml)
    #[arg(long)]
    pub input: Option<String>,

    /// Total equity value to allocate
    #[arg(long)]
    pub equity_value: Decimal,

    /// Annualized equity volatility (0.60 = 60%)
    #[arg(long)]
    pub volatility: Decimal,

    /// Continuously compounded risk-free rate
    #[arg(long, default_value = "0")]
    pub risk_free_rate: Decimal,

    /// Years to the expected liquidity event
    #[arg(long, conflicts_with_all = ["valuation_date", "liquidity_date"])]
    pub time_to_liquidity: Option<Decimal>,

    /// Valuation date (YYYY-MM-DD); use with --liquidity-date
    #[arg(long, requires = "liquidity_date")]
    pub valuation_date: Option<NaiveDate>,

    /// Expected liquidity date (YYYY-MM-DD); use with --valuation-date
    #[arg(long, requires = "valuation_date")]
    pub liquidity_date: Option<NaiveDate>,

    /// Continuous dividend yield on equity value
    #[arg(long, default_value = "0")]
    pub dividend_yield: Decimal,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum TargetArg {
    EquityValue,
    Volatility,
}

/// Arguments for the backsolve solver
#[derive(Args)]
pub struct BacksolveArgs {
    /// Path to a cap table file (.json or .yaml)
    #[arg(long)]
    pub input: Option<String>,

    /// Security whose observed price anchors the solve
    #[arg(long)]
    pub reference: String,

    /// Observed price per share of the reference security
    #[arg(long)]
    pub observed_price: Decimal,

    /// Input to solve for
    #[arg(long, default_value = "equity-value")]
    pub target: TargetArg,

    /// Volatility (required when solving for equity value)
    #[arg(long)]
    pub volatility: Option<Decimal>,

    /// Equity value (required when solving for volatility)
    #[arg(long)]
    pub equity_value: Option<Decimal>,

    /// Continuously compounded risk-free rate
    #[arg(long, default_value = "0")]
    pub risk_free_rate: Decimal,

    /// Years to the expected liquidity event
    #[arg(long)]
    pub time_to_liquidity: Decimal,

    /// Continuous dividend yield on equity value
    #[arg(long, default_value = "0")]
    pub dividend_yield: Decimal,

    /// Solver iteration budget
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Relative price tolerance
    #[arg(long)]
    pub tolerance: Option<Decimal>,

    /// Ceiling for the equity-value search bracket
    #[arg(long)]
    pub upper_bound: Option<Decimal>,
}

pub fn run_breakpoints(args: BreakpointsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let cap_table = load_cap_table(&args.input)?;
    let result = breakpoints::compute_breakpoints(&cap_table)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_allocate(args: AllocateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let cap_table = load_cap_table(&args.input)?;
    let horizon = resolve_horizon(
        args.time_to_liquidity,
        args.valuation_date,
        args.liquidity_date,
    )?;

    let analysis = breakpoints::compute_breakpoints(&cap_table)?;
    let params = BlackScholesParams {
        equity_value: args.equity_value,
        volatility: args.volatility,
        risk_free_rate: args.risk_free_rate,
        time_to_liquidity: horizon,
        dividend_yield: args.dividend_yield,
    };
    let result = opm::value_securities(&analysis.result, &params)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_backsolve(args: BacksolveArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let cap_table = load_cap_table(&args.input)?;
    let analysis = breakpoints::compute_breakpoints(&cap_table)?;

    let request = BacksolveRequest {
        reference_security_id: args.reference,
        observed_price_per_share: args.observed_price,
        target: match args.target {
            TargetArg::EquityValue => SolveTarget::EquityValue,
            TargetArg::Volatility => SolveTarget::Volatility,
        },
        volatility: args.volatility,
        equity_value: args.equity_value,
        risk_free_rate: args.risk_free_rate,
        time_to_liquidity: args.time_to_liquidity,
        dividend_yield: args.dividend_yield,
        max_iterations: args.max_iterations,
        tolerance: args.tolerance,
        upper_bound: args.upper_bound,
    };
    let result = backsolve::backsolve(&analysis.result, &request)?;
    Ok(serde_json::to_value(result)?)
}

fn load_cap_table(path: &Option<String>) -> Result<CapTable, Box<dyn std::error::Error>> {
    let cap_table: CapTable = if let Some(path) = path {
        input::file::read_input(path)?
    } else if let Some(data) = input::stdin::read_stdin()? {
        serde_json::from_value(data)?
    } else {
        return Err("--input <cap_table.json|yaml> or stdin required".into());
    };
    Ok(cap_table)
}

fn resolve_horizon(
    time_to_liquidity: Option<Decimal>,
    valuation_date: Option<NaiveDate>,
    liquidity_date: Option<NaiveDate>,
) -> Result<Decimal, Box<dyn std::error::Error>> {
    if let Some(t) = time_to_liquidity {
        return Ok(t);
    }
    match (valuation_date, liquidity_date) {
        (Some(from), Some(to)) => {
            let t = year_fraction(from, to);
            if t < Decimal::ZERO {
                return Err("liquidity date precedes the valuation date".into());
            }
            Ok(t)
        }
        _ => Err(
            "either --time-to-liquidity or both --valuation-date and --liquidity-date required"
                .into(),
        ),
    }
}
