//! Assignment record and the per-row countdown rules
//!
//! An assignment binds one lead to one consumer. Consumers move it between
//! statuses; the daily recycling sweep counts its countdown down and puts it
//! back into the "call now" state once the countdown hits zero.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::LeadflowError;
use crate::id::now_ms;

/// Which collection an assignment belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentKind {
    /// Created by the allocator from a plan quota
    Subscription,
    /// Created by a single-lead purchase
    Purchased,
}

impl AssignmentKind {
    pub const ALL: [AssignmentKind; 2] = [AssignmentKind::Subscription, AssignmentKind::Purchased];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentKind::Subscription => "subscription",
            AssignmentKind::Purchased => "purchased",
        }
    }

    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            AssignmentKind::Subscription => "subscription_assignments",
            AssignmentKind::Purchased => "purchased_assignments",
        }
    }
}

impl std::fmt::Display for AssignmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AssignmentKind {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "subscription" => Ok(AssignmentKind::Subscription),
            "purchased" => Ok(AssignmentKind::Purchased),
            other => Err(LeadflowError::InvalidInput(format!("unknown assignment kind: {}", other))),
        }
    }
}

/// Consumer-facing disposition of a lead
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    New,
    FollowUp,
    NotInterested,
    Pending,
}

impl AssignmentStatus {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::New => "new",
            AssignmentStatus::FollowUp => "follow_up",
            AssignmentStatus::NotInterested => "not_interested",
            AssignmentStatus::Pending => "pending",
        }
    }
}

impl FromStr for AssignmentStatus {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(AssignmentStatus::New),
            "follow_up" => Ok(AssignmentStatus::FollowUp),
            "not_interested" => Ok(AssignmentStatus::NotInterested),
            "pending" => Ok(AssignmentStatus::Pending),
            other => Err(LeadflowError::InvalidInput(format!("unknown assignment status: {}", other))),
        }
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the consumer should do with the lead right now
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentAction {
    CallNow,
    Pending,
}

impl AssignmentAction {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentAction::CallNow => "call_now",
            AssignmentAction::Pending => "pending",
        }
    }
}

impl FromStr for AssignmentAction {
    type Err = LeadflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call_now" => Ok(AssignmentAction::CallNow),
            "pending" => Ok(AssignmentAction::Pending),
            other => Err(LeadflowError::InvalidInput(format!("unknown assignment action: {}", other))),
        }
    }
}

/// What one day of decay did to a single assignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayEffect {
    pub decremented: bool,
    pub reset: bool,
}

impl DecayEffect {
    pub fn changed(&self) -> bool {
        self.decremented || self.reset
    }
}

/// A (consumer, lead) assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub consumer_id: String,
    pub lead_id: String,
    pub kind: AssignmentKind,
    pub status: AssignmentStatus,
    pub action: AssignmentAction,

    /// Days until the lead resurfaces; None when no countdown is running
    pub countdown_days: Option<u32>,

    /// Unix timestamp in milliseconds
    pub assigned_at: i64,

    /// Unix timestamp in milliseconds
    pub updated_at: i64,
}

impl Assignment {
    /// Fresh, callable assignment
    pub fn new(consumer_id: impl Into<String>, lead_id: impl Into<String>, kind: AssignmentKind) -> Self {
        let now = now_ms();
        Self {
            consumer_id: consumer_id.into(),
            lead_id: lead_id.into(),
            kind,
            status: AssignmentStatus::New,
            action: AssignmentAction::CallNow,
            countdown_days: None,
            assigned_at: now,
            updated_at: now,
        }
    }

    /// Update the timestamp to now.
    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Apply a consumer status change.
    ///
    /// `new` makes the lead callable again and drops any countdown. Every other
    /// status parks the lead until the given countdown (if any) runs out.
    pub fn set_status(&mut self, status: AssignmentStatus, countdown_days: Option<u32>) {
        self.status = status;
        match status {
            AssignmentStatus::New => {
                self.action = AssignmentAction::CallNow;
                self.countdown_days = None;
            }
            _ => {
                self.action = AssignmentAction::Pending;
                self.countdown_days = countdown_days;
            }
        }
        self.touch();
    }

    /// Whether the consumer is expected to call this lead now
    pub fn is_actionable(&self) -> bool {
        self.status == AssignmentStatus::New && self.action == AssignmentAction::CallNow
    }

    /// One day of recycling: decrement a positive countdown, then resurface
    /// the lead if the countdown is at zero. Both steps run in the same call.
    pub fn decay_one_day(&mut self) -> DecayEffect {
        let mut effect = DecayEffect::default();

        if let Some(days) = self.countdown_days {
            if days > 0 {
                self.countdown_days = Some(days - 1);
                effect.decremented = true;
            }
        }

        if self.countdown_days == Some(0) && !self.is_actionable() {
            self.status = AssignmentStatus::New;
            self.action = AssignmentAction::CallNow;
            effect.reset = true;
        }

        if effect.changed() {
            self.touch();
        }
        effect
    }
}
