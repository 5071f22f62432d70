use crate::domain::rail::RailId;
use crate::error::OrchestratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A positive monetary amount in minor currency units (e.g. cents).
///
/// Wraps a `u64` to enforce that payment amounts are always strictly
/// positive; a zero amount is rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub fn new(minor_units: u64) -> Result<Self, OrchestratorError> {
        if minor_units > 0 {
            Ok(Self(minor_units))
        } else {
            Err(OrchestratorError::Validation(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn minor_units(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = OrchestratorError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Caller-specified urgency of a payment.
///
/// Emergency payments carry a hard 4-hour completion SLA; urgent payments
/// get a configurable window. Standard and batch payments have no deadline
/// and are routed by cost instead of speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Emergency,
    Urgent,
    Standard,
    Batch,
}

impl Priority {
    /// Emergency and urgent payments rank rails by settlement speed.
    pub fn prefers_speed(&self) -> bool {
        matches!(self, Priority::Emergency | Priority::Urgent)
    }
}

/// Lifecycle states of a payment.
///
/// `INITIATED → ROUTED → SUBMITTED → {PENDING} → COMPLETED | FAILED`, with a
/// failed attempt looping back to `ROUTED` while the retry budget lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Initiated,
    Routed,
    Submitted,
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    /// Whether the state machine permits a transition to `next`.
    ///
    /// Transitions are monotonic except for failover: a submitted or pending
    /// payment whose provider reports failure may be re-routed.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Initiated, Routed | Failed)
                | (Routed, Routed | Submitted | Failed)
                | (Submitted, Pending | Completed | Failed | Routed)
                | (Pending, Completed | Failed | Routed)
        )
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Routed => "ROUTED",
            PaymentStatus::Submitted => "SUBMITTED",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Outcome recorded for a single rail attempt in the payment's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum AttemptOutcome {
    /// The provider accepted the transfer and assigned a transfer id.
    Submitted,
    /// The provider declined this rail; failover-safe.
    Rejected(String),
    /// The request provably never reached the provider (connection refused,
    /// timeout on an idempotency-keyed request); failover-safe.
    Retryable(String),
    /// Malformed request or compliance block; terminal for the payment.
    FatalInvalid(String),
    /// The provider accepted the transfer but later reported settlement
    /// failure via webhook.
    SettlementFailed(String),
}

/// One entry of the append-only rail history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RailAttempt {
    pub rail: RailId,
    pub submitted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

/// The durable orchestration record for a single payment.
///
/// Created once per correlation id and never deleted; every mutation bumps
/// `version`, which the store uses for compare-and-set updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub correlation_id: String,
    pub amount: Amount,
    pub priority: Priority,
    pub source_funding_source: String,
    pub destination_funding_source: String,
    pub metadata: BTreeMap<String, String>,
    pub status: PaymentStatus,
    pub current_rail: Option<RailId>,
    pub rail_history: Vec<RailAttempt>,
    pub provider_transfer_id: Option<String>,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub sla_breached: bool,
    /// Set once the SLA monitor has escalated this payment; failover then
    /// ranks remaining rails by speed regardless of priority.
    pub escalated: bool,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Payment {
    pub fn new(
        correlation_id: String,
        amount: Amount,
        priority: Priority,
        source_funding_source: String,
        destination_funding_source: String,
        metadata: BTreeMap<String, String>,
        sla_deadline: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            correlation_id,
            amount,
            priority,
            source_funding_source,
            destination_funding_source,
            metadata,
            status: PaymentStatus::Initiated,
            current_rail: None,
            rail_history: Vec::new(),
            provider_transfer_id: None,
            sla_deadline,
            sla_breached: false,
            escalated: false,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Validated state transition. Returns `false` and leaves the record
    /// untouched when the state machine forbids the move.
    pub fn transition_to(&mut self, next: PaymentStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Rails this payment has already attempted, for failover exclusion.
    pub fn attempted_rails(&self) -> Vec<RailId> {
        self.rail_history.iter().map(|a| a.rail).collect()
    }

    pub fn view(&self) -> PaymentView {
        PaymentView {
            id: self.id,
            correlation_id: self.correlation_id.clone(),
            status: self.status,
            current_rail: self.current_rail,
            amount: self.amount,
            priority: self.priority,
            created_at: self.created_at,
            updated_at: self.updated_at,
            sla_deadline: self.sla_deadline,
            sla_breached: self.sla_breached,
        }
    }
}

/// Caller-facing projection of a payment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub correlation_id: String,
    pub status: PaymentStatus,
    pub current_rail: Option<RailId>,
    pub amount: Amount,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sla_deadline: Option<DateTime<Utc>>,
    pub sla_breached: bool,
}
