//! Waterfall breakpoint engine.
//!
//! Transforms a cap-table snapshot into an ordered, gapless sequence of
//! exit-value intervals. Within each interval the marginal distribution of
//! proceeds is constant, so every security's payoff is piecewise linear in
//! exit value and each interval records who participates and at what
//! percentage of each incremental dollar.
//!
//! The walk proceeds in two zones. First the liquidation preference stack
//! is paid senior-to-junior, one interval per tier. Above the stack every
//! marginal dollar flows to the pro-rata pool (common, participating
//! preferred as-converted, vested zero-strike grants); the walk then solves,
//! against the current participation structure, for the next of:
//!
//! - an option or warrant whose strike is reached by the cumulative
//!   per-common-share value,
//! - a capped participating series reaching its total-payoff cap,
//! - a non-participating series (or a capped-out series) whose as-converted
//!   value crosses its preference (or cap).
//!
//! Simultaneous events are merged into a single transition; zero-width
//! intervals are never emitted.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::captable::{CapTable, OptionGrant, Participation, ShareClass, ShareClassKind};
use crate::types::{with_metadata, ComputationOutput, Money};
use crate::CapstackResult;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Why a new interval begins at its `from_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakpointKind {
    /// A liquidation preference tier is being paid.
    LiquidationPreference,
    /// The preference stack is exhausted; pro-rata distribution begins.
    ProRata,
    /// An option or warrant strike has been reached.
    OptionExercise,
    /// A capped participating series has hit its total-payoff cap.
    CapReached,
    /// A series converts to common, forfeiting its preference (or cap).
    Conversion,
}

/// One security's share of the marginal dollar within an interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipationSlice {
    pub security_id: String,
    /// As-converted shares participating in this interval.
    pub shares: Decimal,
    /// Share of each incremental dollar, in percent. Sums to 100 per interval.
    pub percentage: Decimal,
}

/// A single exit-value interval with constant marginal distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakpoint {
    pub kind: BreakpointKind,
    pub from_value: Money,
    /// `None` marks the final, unbounded interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_value: Option<Money>,
    pub participants: Vec<ParticipationSlice>,
}

/// Roster entry used downstream to divide allocated value into per-share terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityStake {
    pub security_id: String,
    pub name: String,
    /// Denominator for value-per-share: outstanding shares for stock,
    /// option count for grants.
    pub shares: Decimal,
}

/// Full output of the breakpoint engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakpointAnalysis {
    pub breakpoints: Vec<Breakpoint>,
    pub securities: Vec<SecurityStake>,
}

// ---------------------------------------------------------------------------
// Walk state
// ---------------------------------------------------------------------------

/// Two breakpoints closer than this are treated as one transition.
const MERGE_EPS: Decimal = dec!(0.000000001);

struct PreferredSlot<'a> {
    class: &'a ShareClass,
    /// Preference including accrued dividends.
    lp: Decimal,
    /// Total payoff ceiling, capped participating only.
    cap: Option<Decimal>,
    /// As-converted share count.
    cs: Decimal,
    converted: bool,
    capped: bool,
    /// Pool dollars absorbed while actively participating (cap tracking).
    pool_received: Decimal,
}

impl PreferredSlot<'_> {
    /// Whether the series takes part in the pro-rata pool right now.
    fn is_active(&self) -> bool {
        !self.capped && (self.converted || self.class.participation != Participation::NonParticipating)
    }
}

struct GrantSlot<'a> {
    grant: &'a OptionGrant,
    exercised: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkEvent {
    Exercise(usize),
    CapHit(usize),
    Convert(usize),
}

impl WalkEvent {
    fn kind(self) -> BreakpointKind {
        match self {
            WalkEvent::Exercise(_) => BreakpointKind::OptionExercise,
            WalkEvent::CapHit(_) => BreakpointKind::CapReached,
            WalkEvent::Convert(_) => BreakpointKind::Conversion,
        }
    }

    /// Precedence when simultaneous events merge into one transition.
    fn rank(self) -> u8 {
        match self {
            WalkEvent::Convert(_) => 0,
            WalkEvent::CapHit(_) => 1,
            WalkEvent::Exercise(_) => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute the ordered breakpoint structure for a cap table.
///
/// Fails fast on a malformed snapshot; zero-share securities are excluded
/// from participation and reported as warnings.
pub fn compute_breakpoints(
    cap_table: &CapTable,
) -> CapstackResult<ComputationOutput<BreakpointAnalysis>> {
    let start = Instant::now();
    cap_table.validate()?;

    let mut warnings: Vec<String> = Vec::new();
    for class in &cap_table.share_classes {
        if class.shares_outstanding == Decimal::ZERO {
            warnings.push(format!(
                "'{}' has zero shares outstanding and is excluded from participation",
                class.name
            ));
        }
    }
    for grant in &cap_table.option_grants {
        if grant.num_options == Decimal::ZERO {
            warnings.push(format!(
                "'{}' has zero options and is excluded from participation",
                grant.name
            ));
        }
    }

    let commons: Vec<&ShareClass> = cap_table
        .share_classes
        .iter()
        .filter(|c| c.kind == ShareClassKind::Common && c.shares_outstanding > Decimal::ZERO)
        .collect();

    let mut prefs: Vec<PreferredSlot> = cap_table
        .share_classes
        .iter()
        .filter(|c| c.kind == ShareClassKind::Preferred && c.shares_outstanding > Decimal::ZERO)
        .map(|c| PreferredSlot {
            class: c,
            lp: c.preference_amount(),
            cap: c.cap_amount(),
            cs: c.as_converted_shares(),
            converted: false,
            capped: false,
            pool_received: Decimal::ZERO,
        })
        .collect();
    prefs.sort_by_key(|p| p.class.seniority);

    // A non-participating series with nothing to forfeit sits in the pool
    // from the first pro-rata dollar.
    for p in prefs.iter_mut() {
        if p.lp == Decimal::ZERO && p.class.participation == Participation::NonParticipating {
            p.converted = true;
        }
    }

    let mut grants: Vec<GrantSlot> = cap_table
        .option_grants
        .iter()
        .filter(|g| g.num_options > Decimal::ZERO)
        .map(|g| GrantSlot {
            grant: g,
            exercised: g.is_common_equivalent(),
        })
        .collect();

    // ── Zone 1: the liquidation preference stack ─────────────────────
    let mut breakpoints: Vec<Breakpoint> = Vec::new();
    let mut cum = Decimal::ZERO;
    for p in prefs.iter().filter(|p| !p.converted && p.lp > Decimal::ZERO) {
        breakpoints.push(Breakpoint {
            kind: BreakpointKind::LiquidationPreference,
            from_value: cum,
            to_value: Some(cum + p.lp),
            participants: vec![ParticipationSlice {
                security_id: p.class.id.clone(),
                shares: p.class.shares_outstanding,
                percentage: dec!(100),
            }],
        });
        cum += p.lp;
    }

    // ── Zone 2: the residual pool walk ───────────────────────────────
    let mut e0 = cum;
    // Cumulative pool dollars per as-converted share present since the
    // start of the residual zone; this is the common per-share value the
    // option strikes are compared against.
    let mut c0 = Decimal::ZERO;
    let mut l_unconv: Decimal = prefs.iter().filter(|p| !p.converted).map(|p| p.lp).sum();
    // Sum of (cap - preference) held flat by capped-out series.
    let mut cap_bound = Decimal::ZERO;
    let mut next_kind = BreakpointKind::ProRata;

    loop {
        let participants = active_participants(&commons, &prefs, &grants);
        let t: Decimal = participants.iter().map(|(_, cs)| *cs).sum();

        let candidates = collect_candidates(&prefs, &grants, e0, c0, t, l_unconv, cap_bound);

        let min_e = candidates
            .iter()
            .map(|(e, _)| *e)
            .min()
            .unwrap_or(Decimal::MAX);

        if candidates.is_empty() {
            breakpoints.push(make_interval(next_kind, e0, None, &participants, t));
            break;
        }

        let batch: Vec<WalkEvent> = candidates
            .iter()
            .filter(|(e, _)| (*e - min_e).abs() <= MERGE_EPS)
            .map(|(_, ev)| *ev)
            .collect();

        if min_e > e0 + MERGE_EPS {
            breakpoints.push(make_interval(next_kind, e0, Some(min_e), &participants, t));
            let delta = min_e - e0;
            c0 += delta / t;
            for p in prefs.iter_mut() {
                if p.is_active() && p.cap.is_some() {
                    p.pool_received += delta * p.cs / t;
                }
            }
            e0 = min_e;
        }

        next_kind = batch
            .iter()
            .min_by_key(|ev| ev.rank())
            .map(|ev| ev.kind())
            .unwrap_or(next_kind);

        for ev in batch {
            match ev {
                WalkEvent::Exercise(i) => grants[i].exercised = true,
                WalkEvent::CapHit(i) => {
                    prefs[i].capped = true;
                    cap_bound += prefs[i].cap.unwrap_or_default() - prefs[i].lp;
                }
                WalkEvent::Convert(i) => {
                    if prefs[i].capped {
                        cap_bound -= prefs[i].cap.unwrap_or_default() - prefs[i].lp;
                        prefs[i].capped = false;
                    }
                    prefs[i].converted = true;
                    l_unconv -= prefs[i].lp;
                }
            }
        }
    }

    // ── Roster ───────────────────────────────────────────────────────
    let mut securities: Vec<SecurityStake> = Vec::new();
    for class in &cap_table.share_classes {
        if class.shares_outstanding > Decimal::ZERO {
            securities.push(SecurityStake {
                security_id: class.id.clone(),
                name: class.name.clone(),
                shares: class.shares_outstanding,
            });
        }
    }
    for grant in &cap_table.option_grants {
        if grant.num_options > Decimal::ZERO {
            securities.push(SecurityStake {
                security_id: grant.id.clone(),
                name: grant.name.clone(),
                shares: grant.num_options,
            });
        }
    }

    let total_preference: Decimal = prefs.iter().map(|p| p.lp).sum();
    let analysis = BreakpointAnalysis {
        breakpoints,
        securities,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Capital-structure waterfall breakpoint analysis",
        &serde_json::json!({
            "share_classes": cap_table.share_classes.len(),
            "option_grants": cap_table.option_grants.len(),
            "total_liquidation_preference": total_preference.to_string(),
            "intervals": analysis.breakpoints.len(),
        }),
        warnings,
        elapsed,
        analysis,
    ))
}

// ---------------------------------------------------------------------------
// Walk internals
// ---------------------------------------------------------------------------

fn active_participants<'a>(
    commons: &[&'a ShareClass],
    prefs: &[PreferredSlot<'a>],
    grants: &[GrantSlot<'a>],
) -> Vec<(&'a str, Decimal)> {
    let mut out: Vec<(&str, Decimal)> = Vec::new();
    for c in commons {
        out.push((c.id.as_str(), c.shares_outstanding));
    }
    for p in prefs {
        if p.is_active() {
            out.push((p.class.id.as_str(), p.cs));
        }
    }
    for g in grants {
        if g.exercised {
            out.push((g.grant.id.as_str(), g.grant.num_options));
        }
    }
    out
}

/// Solve, within the current linear regime, the exit value at which each
/// pending event occurs. Candidates are exact because every payoff is
/// linear in exit value between transitions.
fn collect_candidates(
    prefs: &[PreferredSlot],
    grants: &[GrantSlot],
    e0: Decimal,
    c0: Decimal,
    t: Decimal,
    l_unconv: Decimal,
    cap_bound: Decimal,
) -> Vec<(Decimal, WalkEvent)> {
    let mut out: Vec<(Decimal, WalkEvent)> = Vec::new();

    for (i, g) in grants.iter().enumerate() {
        if g.exercised {
            continue;
        }
        // Common per-share value reaches the strike.
        let e = e0 + (g.grant.exercise_price - c0) * t;
        out.push((e.max(e0), WalkEvent::Exercise(i)));
    }

    for (i, p) in prefs.iter().enumerate() {
        if p.converted {
            continue;
        }
        if p.capped {
            // Capped out: converting forfeits both preference and cap, and
            // returns them to the pool the series would rejoin.
            let cap = p.cap.unwrap_or_default();
            let e = (l_unconv - p.lp) + (cap_bound - (cap - p.lp)) + cap * (t + p.cs) / p.cs;
            out.push((e.max(e0), WalkEvent::Convert(i)));
            continue;
        }
        match p.class.participation {
            Participation::NonParticipating => {
                // As-converted value crosses the preference.
                let e = (l_unconv - p.lp) + cap_bound + p.lp * (t + p.cs) / p.cs;
                out.push((e.max(e0), WalkEvent::Convert(i)));
            }
            Participation::ParticipatingWithCap => {
                let room = p.cap.unwrap_or_default() - p.lp - p.pool_received;
                let e = e0 + room * t / p.cs;
                out.push((e.max(e0), WalkEvent::CapHit(i)));
            }
            Participation::Participating => {}
        }
    }

    out
}

fn make_interval(
    kind: BreakpointKind,
    from: Decimal,
    to: Option<Decimal>,
    participants: &[(&str, Decimal)],
    t: Decimal,
) -> Breakpoint {
    let hundred = dec!(100);
    Breakpoint {
        kind,
        from_value: from,
        to_value: to,
        participants: participants
            .iter()
            .map(|(id, cs)| ParticipationSlice {
                security_id: (*id).to_string(),
                shares: *cs,
                percentage: *cs / t * hundred,
            })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captable::GrantKind;

    fn common_class(shares: Decimal) -> ShareClass {
        ShareClass {
            id: "common".into(),
            name: "Common".into(),
            kind: ShareClassKind::Common,
            shares_outstanding: shares,
            price_per_share: dec!(0.01),
            liquidation_preference_multiple: Decimal::ONE,
            participation: Participation::NonParticipating,
            participation_cap: None,
            seniority: 99,
            conversion_ratio: Decimal::ONE,
            dividend_rate: Decimal::ZERO,
            dividend_years: Decimal::ZERO,
        }
    }

    fn preferred(id: &str, shares: Decimal, price: Decimal, seniority: u32) -> ShareClass {
        ShareClass {
            id: id.into(),
            name: format!("Series {}", id.to_uppercase()),
            kind: ShareClassKind::Preferred,
            shares_outstanding: shares,
            price_per_share: price,
            liquidation_preference_multiple: Decimal::ONE,
            participation: Participation::NonParticipating,
            participation_cap: None,
            seniority,
            conversion_ratio: Decimal::ONE,
            dividend_rate: Decimal::ZERO,
            dividend_years: Decimal::ZERO,
        }
    }

    fn assert_contiguous(bps: &[Breakpoint]) {
        assert_eq!(bps[0].from_value, Decimal::ZERO);
        for pair in bps.windows(2) {
            assert_eq!(pair[0].to_value, Some(pair[1].from_value));
            assert!(pair[1].from_value > pair[0].from_value);
        }
        assert!(bps.last().unwrap().to_value.is_none());
        for bp in bps {
            let total: Decimal = bp.participants.iter().map(|p| p.percentage).sum();
            assert!(
                (total - dec!(100)).abs() < dec!(0.000000001),
                "percentages sum to {total} in interval starting at {}",
                bp.from_value
            );
        }
    }

    // ── Common-only table: a single unbounded pro-rata interval ──────

    #[test]
    fn test_common_only_single_interval() {
        let table = CapTable {
            share_classes: vec![common_class(dec!(10_000_000))],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        assert_eq!(bps.len(), 1);
        assert_eq!(bps[0].kind, BreakpointKind::ProRata);
        assert_eq!(bps[0].from_value, Decimal::ZERO);
        assert!(bps[0].to_value.is_none());
        assert_eq!(bps[0].participants.len(), 1);
        assert_eq!(bps[0].participants[0].percentage, dec!(100));
        assert_contiguous(bps);
    }

    // ── Preference stack ordering follows seniority ──────────────────

    #[test]
    fn test_stack_paid_in_seniority_order() {
        let table = CapTable {
            share_classes: vec![
                common_class(dec!(8_000_000)),
                // Junior series listed first on purpose
                preferred("b", dec!(2_000_000), dec!(1), 2),
                preferred("a", dec!(1_000_000), dec!(1), 1),
            ],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        assert_eq!(bps[0].kind, BreakpointKind::LiquidationPreference);
        assert_eq!(bps[0].participants[0].security_id, "a");
        assert_eq!(bps[0].to_value, Some(dec!(1_000_000)));

        assert_eq!(bps[1].kind, BreakpointKind::LiquidationPreference);
        assert_eq!(bps[1].participants[0].security_id, "b");
        assert_eq!(bps[1].to_value, Some(dec!(3_000_000)));

        assert_eq!(bps[2].kind, BreakpointKind::ProRata);
        assert_eq!(bps[2].from_value, dec!(3_000_000));
        assert_contiguous(bps);
    }

    // ── Non-participating conversion crossover ───────────────────────

    #[test]
    fn test_non_participating_conversion_breakpoint() {
        // Preferred A: 1M shares at $1, 1x NP, 10% of the diluted pool.
        // Conversion where 10% of (E - 0) = $1M, i.e. E = $10M.
        let table = CapTable {
            share_classes: vec![
                common_class(dec!(9_000_000)),
                preferred("a", dec!(1_000_000), dec!(1), 1),
            ],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        assert_eq!(bps.len(), 3);
        assert_eq!(bps[1].kind, BreakpointKind::ProRata);
        assert_eq!(bps[1].from_value, dec!(1_000_000));
        assert_eq!(bps[1].to_value, Some(dec!(10_000_000)));
        assert_eq!(bps[1].participants.len(), 1);
        assert_eq!(bps[1].participants[0].security_id, "common");

        assert_eq!(bps[2].kind, BreakpointKind::Conversion);
        assert_eq!(bps[2].from_value, dec!(10_000_000));
        let a = bps[2]
            .participants
            .iter()
            .find(|p| p.security_id == "a")
            .unwrap();
        assert_eq!(a.percentage, dec!(1_000_000) / dec!(10_000_000) * dec!(100));
        assert_contiguous(bps);
    }

    // ── Option exercise threshold ─────────────────────────────────────

    #[test]
    fn test_option_exercise_breakpoint() {
        // Strike $0.50 against 9M common above a $1M stack:
        // exercise at E = 1M + 0.50 * 9M = 5.5M.
        let table = CapTable {
            share_classes: vec![
                common_class(dec!(9_000_000)),
                preferred("a", dec!(1_000_000), dec!(1), 1),
            ],
            option_grants: vec![OptionGrant {
                id: "pool".into(),
                name: "Option Pool".into(),
                kind: GrantKind::Option,
                num_options: dec!(1_000_000),
                exercise_price: dec!(0.50),
            }],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        assert_eq!(bps.len(), 4);
        assert_eq!(bps[2].kind, BreakpointKind::OptionExercise);
        assert_eq!(bps[2].from_value, dec!(5_500_000));
        let pool = bps[2]
            .participants
            .iter()
            .find(|p| p.security_id == "pool")
            .unwrap();
        assert_eq!(pool.percentage, dec!(1_000_000) / dec!(10_000_000) * dec!(100));

        // Dilution pushes Series A's conversion out to 11M.
        assert_eq!(bps[3].kind, BreakpointKind::Conversion);
        assert_eq!(bps[3].from_value, dec!(11_000_000));
        assert_contiguous(bps);
    }

    // ── Capped participation: cap hit, then conversion out of the cap ─

    #[test]
    fn test_capped_participating_walk() {
        // Series B: 1M at $1, participating with a 2x total cap.
        // Pool share 10%; cap room $1M absorbed by E = 1M + 1M*10 = 11M.
        // Conversion out of the cap where 10% of E = $2M, i.e. E = 20M.
        let mut b = preferred("b", dec!(1_000_000), dec!(1), 1);
        b.participation = Participation::ParticipatingWithCap;
        b.participation_cap = Some(dec!(2));
        let table = CapTable {
            share_classes: vec![common_class(dec!(9_000_000)), b],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        assert_eq!(bps.len(), 4);
        assert_eq!(bps[1].kind, BreakpointKind::ProRata);
        assert_eq!(bps[1].participants.len(), 2);

        assert_eq!(bps[2].kind, BreakpointKind::CapReached);
        assert_eq!(bps[2].from_value, dec!(11_000_000));
        assert_eq!(bps[2].participants.len(), 1);
        assert_eq!(bps[2].participants[0].security_id, "common");

        assert_eq!(bps[3].kind, BreakpointKind::Conversion);
        assert_eq!(bps[3].from_value, dec!(20_000_000));
        assert!(bps[3].to_value.is_none());
        // Series B is back in the pool after converting out of its cap.
        assert_eq!(bps[3].participants.len(), 2);
        assert_contiguous(bps);
    }

    // ── Simultaneous events merge into one transition ─────────────────

    #[test]
    fn test_identical_strikes_merge() {
        let grant = |id: &str| OptionGrant {
            id: id.into(),
            name: format!("Grant {id}"),
            kind: GrantKind::Option,
            num_options: dec!(500_000),
            exercise_price: dec!(0.25),
        };
        let table = CapTable {
            share_classes: vec![common_class(dec!(10_000_000))],
            option_grants: vec![grant("g1"), grant("g2")],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        // One pro-rata interval, then one merged exercise transition.
        assert_eq!(bps.len(), 2);
        assert_eq!(bps[1].kind, BreakpointKind::OptionExercise);
        assert_eq!(bps[1].from_value, dec!(2_500_000));
        assert_eq!(bps[1].participants.len(), 3);
        assert_contiguous(bps);
    }

    // ── Zero-preference non-participating preferred joins the pool ────

    #[test]
    fn test_zero_preference_series_participates_from_start() {
        let mut a = preferred("a", dec!(1_000_000), dec!(1), 1);
        a.liquidation_preference_multiple = Decimal::ZERO;
        let table = CapTable {
            share_classes: vec![common_class(dec!(9_000_000)), a],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        assert_eq!(bps.len(), 1);
        assert_eq!(bps[0].from_value, Decimal::ZERO);
        assert_eq!(bps[0].participants.len(), 2);
        assert_contiguous(bps);
    }

    // ── Zero-share securities excluded with a warning ─────────────────

    #[test]
    fn test_zero_share_class_excluded_with_warning() {
        let table = CapTable {
            share_classes: vec![common_class(dec!(1_000_000)), {
                let mut dead = preferred("a", Decimal::ZERO, dec!(1), 1);
                dead.name = "Series A".into();
                dead
            }],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        assert_eq!(result.result.breakpoints.len(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("Series A")));
        assert!(result
            .result
            .securities
            .iter()
            .all(|s| s.security_id != "a"));
    }

    // ── Accrued dividends widen the preference tier ───────────────────

    #[test]
    fn test_dividends_extend_preference_interval() {
        let mut a = preferred("a", dec!(1_000_000), dec!(1), 1);
        a.dividend_rate = dec!(0.08);
        a.dividend_years = dec!(2);
        let table = CapTable {
            share_classes: vec![common_class(dec!(9_000_000)), a],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        assert_eq!(bps[0].to_value, Some(dec!(1_160_000)));
        assert_contiguous(bps);
    }

    // ── Conversion ratio drives as-converted pool shares ──────────────

    #[test]
    fn test_conversion_ratio_affects_pool_shares() {
        let mut a = preferred("a", dec!(1_000_000), dec!(1), 1);
        a.conversion_ratio = dec!(2);
        a.participation = Participation::Participating;
        let table = CapTable {
            share_classes: vec![common_class(dec!(8_000_000)), a],
            option_grants: vec![],
        };
        let result = compute_breakpoints(&table).unwrap();
        let bps = &result.result.breakpoints;

        let slice = bps[1]
            .participants
            .iter()
            .find(|p| p.security_id == "a")
            .unwrap();
        assert_eq!(slice.shares, dec!(2_000_000));
        assert_eq!(slice.percentage, dec!(2_000_000) / dec!(10_000_000) * dec!(100));
        assert_contiguous(bps);
    }

    // ── Malformed tables fail fast ─────────────────────────────────────

    #[test]
    fn test_malformed_table_fails_fast() {
        let table = CapTable {
            share_classes: vec![
                common_class(dec!(1_000_000)),
                preferred("a", dec!(1_000_000), dec!(1), 1),
                preferred("b", dec!(1_000_000), dec!(1), 1),
            ],
            option_grants: vec![],
        };
        assert!(compute_breakpoints(&table).is_err());
    }
}
