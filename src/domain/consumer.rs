//! Consumer record and plan tiers

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::LeadflowError;
use crate::id::now_ms;

/// Subscription plan tier, lowest to highest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Entry level, weekly allotment
    Free,
    Basic,
    Standard,
    Premium,
}

impl PlanTier {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Basic => "basic",
            PlanTier::Standard => "standard",
            PlanTier::Premium => "premium",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(PlanTier::Free),
            "basic" => Ok(PlanTier::Basic),
            "standard" => Ok(PlanTier::Standard),
            "premium" => Ok(PlanTier::Premium),
            other => Err(LeadflowError::InvalidInput(format!("unknown plan tier: {}", other))),
        }
    }
}

/// Billing state of a consumer's subscription
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Only active subscriptions take part in scheduled distribution
    pub fn is_active(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(SubscriptionStatus::Active),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            other => Err(LeadflowError::InvalidInput(format!(
                "unknown subscription status: {}",
                other
            ))),
        }
    }
}

/// A lead consumer (subscriber)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Consumer {
    pub id: String,

    pub plan_tier: PlanTier,

    pub subscription: SubscriptionStatus,

    /// Next pool index to scan; only the allocator moves it
    pub cursor: u64,

    /// Unix timestamp in milliseconds
    pub created_at: i64,

    /// Unix timestamp in milliseconds
    pub updated_at: i64,
}

impl Consumer {
    /// Create an active consumer starting at the head of the pool
    pub fn new(id: impl Into<String>, plan_tier: PlanTier) -> Self {
        let now = now_ms();
        Self {
            id: id.into(),
            plan_tier,
            subscription: SubscriptionStatus::Active,
            cursor: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style subscription override
    pub fn with_subscription(mut self, subscription: SubscriptionStatus) -> Self {
        self.subscription = subscription;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_tier_parse_case_insensitive() {
        assert_eq!("Premium".parse::<PlanTier>().unwrap(), PlanTier::Premium);
        assert_eq!("free".parse::<PlanTier>().unwrap(), PlanTier::Free);
        assert!("gold".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_plan_tier_ordering() {
        assert!(PlanTier::Free < PlanTier::Basic);
        assert!(PlanTier::Standard < PlanTier::Premium);
    }

    #[test]
    fn test_plan_tier_serde_lowercase() {
        let json = serde_json::to_string(&PlanTier::Standard).unwrap();
        assert_eq!(json, "\"standard\"");
    }

    #[test]
    fn test_subscription_status_parse() {
        assert_eq!(
            "past_due".parse::<SubscriptionStatus>().unwrap(),
            SubscriptionStatus::PastDue
        );
        assert!(SubscriptionStatus::Active.is_active());
        assert!(!SubscriptionStatus::Canceled.is_active());
    }

    #[test]
    fn test_new_consumer_defaults() {
        let consumer = Consumer::new("c-1", PlanTier::Basic);
        assert_eq!(consumer.cursor, 0);
        assert_eq!(consumer.subscription, SubscriptionStatus::Active);
    }

    #[test]
    fn test_consumer_builders() {
        let consumer = Consumer::new("c-1", PlanTier::Basic)
            .with_subscription(SubscriptionStatus::Canceled);
        assert!(!consumer.subscription.is_active());
    }
}
