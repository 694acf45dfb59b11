//! Cap-table snapshot: share classes, option grants, and input validation.
//!
//! Everything here is an immutable value object deserialized per request.
//! The engine never mutates a cap table; it only reads it to derive the
//! breakpoint structure.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CapstackError;
use crate::types::{Money, Multiple, Rate, Years};
use crate::CapstackResult;

// ---------------------------------------------------------------------------
// Share classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareClassKind {
    Common,
    Preferred,
}

/// Participation rights of a preferred series in residual proceeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Participation {
    /// Takes the higher of the preference or the as-converted common value.
    #[default]
    NonParticipating,
    /// Takes the preference and shares pro-rata in the residual.
    Participating,
    /// Participating, but total proceeds capped at a multiple of invested capital.
    ParticipatingWithCap,
}

/// One class of stock on the cap table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareClass {
    pub id: String,
    pub name: String,
    pub kind: ShareClassKind,
    pub shares_outstanding: Decimal,
    pub price_per_share: Money,
    /// Preference as a multiple of invested capital. Ignored for common.
    #[serde(default = "default_one")]
    pub liquidation_preference_multiple: Multiple,
    #[serde(default)]
    pub participation: Participation,
    /// Total-payoff cap (preference plus participation) as a multiple of
    /// invested capital. Required for `ParticipatingWithCap`, invalid otherwise.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub participation_cap: Option<Multiple>,
    /// Payment rank within the preference stack; lower is paid first.
    /// Must be unique across preferred series.
    pub seniority: u32,
    /// Common shares received per preferred share on conversion.
    #[serde(default = "default_one")]
    pub conversion_ratio: Decimal,
    /// Simple cumulative dividend rate on the original issue price (0.08 = 8%).
    #[serde(default)]
    pub dividend_rate: Rate,
    /// Years of accrued, unpaid cumulative dividends.
    #[serde(default)]
    pub dividend_years: Years,
}

fn default_one() -> Decimal {
    Decimal::ONE
}

impl ShareClass {
    /// Original dollars invested in the series.
    pub fn invested_capital(&self) -> Money {
        self.shares_outstanding * self.price_per_share
    }

    /// Liquidation preference including accrued cumulative dividends.
    pub fn preference_amount(&self) -> Money {
        let invested = self.invested_capital();
        invested * self.liquidation_preference_multiple
            + invested * self.dividend_rate * self.dividend_years
    }

    /// Total payoff ceiling for a capped participating series.
    pub fn cap_amount(&self) -> Option<Money> {
        self.participation_cap
            .map(|cap| self.invested_capital() * cap)
    }

    /// Share count on an as-converted-to-common basis.
    pub fn as_converted_shares(&self) -> Decimal {
        self.shares_outstanding * self.conversion_ratio
    }
}

// ---------------------------------------------------------------------------
// Option grants
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantKind {
    Option,
    Warrant,
    Rsu,
}

/// An option, warrant, or RSU pool entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionGrant {
    pub id: String,
    pub name: String,
    pub kind: GrantKind,
    pub num_options: Decimal,
    pub exercise_price: Money,
}

impl OptionGrant {
    /// RSUs and zero-strike grants behave like outstanding common.
    pub fn is_common_equivalent(&self) -> bool {
        self.kind == GrantKind::Rsu || self.exercise_price == Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Cap table
// ---------------------------------------------------------------------------

/// Immutable snapshot of the full capital structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapTable {
    pub share_classes: Vec<ShareClass>,
    #[serde(default)]
    pub option_grants: Vec<OptionGrant>,
}

impl CapTable {
    /// Validate the snapshot, failing fast on the first malformed entry.
    ///
    /// Errors always name the offending security; data is never dropped
    /// silently to "make the table work".
    pub fn validate(&self) -> CapstackResult<()> {
        for class in &self.share_classes {
            if class.shares_outstanding < Decimal::ZERO {
                return Err(CapstackError::CapTable {
                    security: class.name.clone(),
                    reason: "shares outstanding cannot be negative".into(),
                });
            }
            if class.price_per_share < Decimal::ZERO {
                return Err(CapstackError::CapTable {
                    security: class.name.clone(),
                    reason: "price per share cannot be negative".into(),
                });
            }
            if class.liquidation_preference_multiple < Decimal::ZERO {
                return Err(CapstackError::CapTable {
                    security: class.name.clone(),
                    reason: "liquidation preference multiple cannot be negative".into(),
                });
            }
            if class.conversion_ratio <= Decimal::ZERO {
                return Err(CapstackError::CapTable {
                    security: class.name.clone(),
                    reason: "conversion ratio must be positive".into(),
                });
            }
            if class.dividend_rate < Decimal::ZERO || class.dividend_years < Decimal::ZERO {
                return Err(CapstackError::CapTable {
                    security: class.name.clone(),
                    reason: "dividend terms cannot be negative".into(),
                });
            }
            match class.participation {
                Participation::ParticipatingWithCap => match class.participation_cap {
                    None => {
                        return Err(CapstackError::CapTable {
                            security: class.name.clone(),
                            reason: "participating-with-cap requires a participation cap".into(),
                        });
                    }
                    Some(cap) if cap <= class.liquidation_preference_multiple => {
                        return Err(CapstackError::CapTable {
                            security: class.name.clone(),
                            reason: "participation cap must exceed the liquidation preference multiple"
                                .into(),
                        });
                    }
                    Some(_) => {}
                },
                _ if class.participation_cap.is_some() => {
                    return Err(CapstackError::CapTable {
                        security: class.name.clone(),
                        reason: "participation cap is only valid for participating-with-cap".into(),
                    });
                }
                _ => {}
            }
        }

        // Unique seniority among preferred series
        let preferred: Vec<&ShareClass> = self
            .share_classes
            .iter()
            .filter(|c| c.kind == ShareClassKind::Preferred)
            .collect();
        for (i, a) in preferred.iter().enumerate() {
            for b in preferred.iter().skip(i + 1) {
                if a.seniority == b.seniority {
                    return Err(CapstackError::CapTable {
                        security: format!("{} / {}", a.name, b.name),
                        reason: format!("duplicate seniority rank {}", a.seniority),
                    });
                }
            }
        }

        for grant in &self.option_grants {
            if grant.num_options < Decimal::ZERO {
                return Err(CapstackError::CapTable {
                    security: grant.name.clone(),
                    reason: "option count cannot be negative".into(),
                });
            }
            if grant.exercise_price < Decimal::ZERO {
                return Err(CapstackError::CapTable {
                    security: grant.name.clone(),
                    reason: "exercise price cannot be negative".into(),
                });
            }
        }

        // Unique ids across the whole table
        let mut ids: Vec<&str> = self
            .share_classes
            .iter()
            .map(|c| c.id.as_str())
            .chain(self.option_grants.iter().map(|g| g.id.as_str()))
            .collect();
        ids.sort_unstable();
        for pair in ids.windows(2) {
            if pair[0] == pair[1] {
                return Err(CapstackError::CapTable {
                    security: pair[0].to_string(),
                    reason: "duplicate security id".into(),
                });
            }
        }

        // The residual zone needs at least one claimant that participates
        // from the start and never drops out, or marginal dollars above the
        // preference stack would have no recipient.
        let has_perpetual_claimant = self
            .share_classes
            .iter()
            .any(|c| {
                c.shares_outstanding > Decimal::ZERO
                    && (c.kind == ShareClassKind::Common
                        || c.participation == Participation::Participating)
            })
            || self
                .option_grants
                .iter()
                .any(|g| g.num_options > Decimal::ZERO && g.is_common_equivalent());
        if !has_perpetual_claimant {
            return Err(CapstackError::CapTable {
                security: "cap table".into(),
                reason: "no common or participating shares to receive residual proceeds".into(),
            });
        }

        Ok(())
    }
}
