//! Quota policy: plan tier to per-cadence allotment
//!
//! The tier table is plain configuration (`quota:` section of the config file)
//! so environments and tests can swap it. Resolution is a pure function of the
//! table, the tier and the local weekday.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::PlanTier;

/// How often a tier's allotment becomes due
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "every", rename_all = "lowercase")]
pub enum Cadence {
    /// Due on every run day
    Day,
    /// Due only on the given weekday
    Week { on: Weekday },
}

impl Cadence {
    /// Whether an allotment with this cadence is due on `weekday`
    pub fn is_due(&self, weekday: Weekday) -> bool {
        match self {
            Cadence::Day => true,
            Cadence::Week { on } => *on == weekday,
        }
    }
}

/// Allotment rule for a single tier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuotaRule {
    pub amount: u32,
    pub cadence: Cadence,
}

/// Outcome of resolving a tier's quota for a particular day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Leads due today (0 when nothing is due)
    pub amount: u32,
    /// Configured cadence, None when the tier has no rule
    pub cadence: Option<Cadence>,
}

impl Quota {
    pub fn is_due(&self) -> bool {
        self.amount > 0
    }

    /// Why nothing is due, if nothing is
    pub fn unavailable_reason(&self) -> Option<&'static str> {
        match (self.amount, self.cadence) {
            (0, None) => Some("no quota configured for plan"),
            (0, Some(_)) => Some("quota not available today"),
            _ => None,
        }
    }
}

/// Tier table handed to the resolver
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct QuotaPolicy {
    rules: HashMap<PlanTier, QuotaRule>,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self::new()
            .with_rule(
                PlanTier::Free,
                QuotaRule {
                    amount: 1,
                    cadence: Cadence::Week { on: Weekday::Mon },
                },
            )
            .with_rule(
                PlanTier::Basic,
                QuotaRule {
                    amount: 5,
                    cadence: Cadence::Day,
                },
            )
            .with_rule(
                PlanTier::Standard,
                QuotaRule {
                    amount: 10,
                    cadence: Cadence::Day,
                },
            )
            .with_rule(
                PlanTier::Premium,
                QuotaRule {
                    amount: 20,
                    cadence: Cadence::Day,
                },
            )
    }
}

impl QuotaPolicy {
    /// Empty table; every tier resolves to zero
    pub fn new() -> Self {
        Self { rules: HashMap::new() }
    }

    /// Add or replace a tier's rule
    pub fn with_rule(mut self, tier: PlanTier, rule: QuotaRule) -> Self {
        self.rules.insert(tier, rule);
        self
    }

    pub fn rule(&self, tier: PlanTier) -> Option<&QuotaRule> {
        self.rules.get(&tier)
    }

    /// Allotment due for `tier` on `weekday`
    pub fn resolve(&self, tier: PlanTier, weekday: Weekday) -> Quota {
        match self.rules.get(&tier) {
            Some(rule) => Quota {
                amount: if rule.cadence.is_due(weekday) { rule.amount } else { 0 },
                cadence: Some(rule.cadence),
            },
            None => Quota {
                amount: 0,
                cadence: None,
            },
        }
    }

    /// Full allotment of a tier ignoring cadence (plan upgrade grants)
    pub fn immediate_grant(&self, tier: PlanTier) -> Quota {
        match self.rules.get(&tier) {
            Some(rule) => Quota {
                amount: rule.amount,
                cadence: Some(rule.cadence),
            },
            None => Quota {
                amount: 0,
                cadence: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_tier_due_only_on_monday() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.resolve(PlanTier::Free, Weekday::Mon).amount, 1);
        let tuesday = policy.resolve(PlanTier::Free, Weekday::Tue);
        assert_eq!(tuesday.amount, 0);
        assert_eq!(tuesday.unavailable_reason(), Some("quota not available today"));
    }

    #[test]
    fn test_paid_tiers_increase_and_are_daily() {
        let policy = QuotaPolicy::default();
        let basic = policy.resolve(PlanTier::Basic, Weekday::Sun).amount;
        let standard = policy.resolve(PlanTier::Standard, Weekday::Sun).amount;
        let premium = policy.resolve(PlanTier::Premium, Weekday::Sun).amount;
        assert!(basic < standard && standard < premium);
        assert!(basic > 1);
    }

    #[test]
    fn test_missing_tier_resolves_to_zero() {
        let policy = QuotaPolicy::new();
        let quota = policy.resolve(PlanTier::Premium, Weekday::Mon);
        assert!(!quota.is_due());
        assert_eq!(quota.unavailable_reason(), Some("no quota configured for plan"));
    }

    #[test]
    fn test_immediate_grant_ignores_weekday() {
        let policy = QuotaPolicy::default();
        assert_eq!(policy.immediate_grant(PlanTier::Free).amount, 1);
    }

    #[test]
    fn test_policy_from_yaml() {
        let yaml = r#"
free:
  amount: 2
  cadence:
    every: week
    on: Fri
premium:
  amount: 50
  cadence:
    every: day
"#;
        let policy: QuotaPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.resolve(PlanTier::Free, Weekday::Fri).amount, 2);
        assert_eq!(policy.resolve(PlanTier::Free, Weekday::Mon).amount, 0);
        assert_eq!(policy.resolve(PlanTier::Premium, Weekday::Mon).amount, 50);
        assert!(policy.rule(PlanTier::Basic).is_none());
    }
}
