use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier of a payment network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RailId {
    Fednow,
    Rtp,
    SameDayAch,
    StandardAch,
    Wire,
    Stablecoin,
}

impl std::fmt::Display for RailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RailId::Fednow => "fednow",
            RailId::Rtp => "rtp",
            RailId::SameDayAch => "same-day-ach",
            RailId::StandardAch => "standard-ach",
            RailId::Wire => "wire",
            RailId::Stablecoin => "stablecoin",
        };
        f.write_str(s)
    }
}

/// How fast a rail settles. Ordering follows settlement speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SettlementClass {
    Instant,
    SameDay,
    Standard,
    Wire,
}

impl SettlementClass {
    /// Rank for speed-based ordering: instant < same-day < standard < wire.
    pub fn speed_rank(&self) -> u8 {
        match self {
            SettlementClass::Instant => 0,
            SettlementClass::SameDay => 1,
            SettlementClass::Standard => 2,
            SettlementClass::Wire => 3,
        }
    }
}

/// Config entry describing one rail. Not persisted per payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rail {
    pub id: RailId,
    pub settlement_class: SettlementClass,
    /// Inclusive amount bounds in minor currency units.
    pub min_amount: u64,
    pub max_amount: u64,
    pub requires_instant_eligibility: bool,
    pub enabled: bool,
    /// Expected time to settlement, used for SLA-aware routing.
    pub avg_latency_secs: u64,
    /// Flat fee in minor units, used for cost-based ordering.
    pub cost: u64,
}

impl Rail {
    pub fn avg_latency(&self) -> Duration {
        Duration::from_secs(self.avg_latency_secs)
    }

    pub fn accepts_amount(&self, minor_units: u64) -> bool {
        minor_units >= self.min_amount && minor_units <= self.max_amount
    }
}

/// Ordered table of configured rails. Declaration order is preserved and
/// used as the stable tie-break during selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RailCatalog {
    rails: Vec<Rail>,
}

impl RailCatalog {
    pub fn new(rails: Vec<Rail>) -> Self {
        Self { rails }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rail> {
        self.rails.iter()
    }

    pub fn get(&self, id: RailId) -> Option<&Rail> {
        self.rails.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rails.is_empty()
    }
}

impl Default for RailCatalog {
    /// Built-in catalog mirroring the production rail fallback order:
    /// FedNow, RTP, same-day ACH, standard ACH, wire. Stablecoin transfer
    /// ships disabled and must be switched on via config.
    fn default() -> Self {
        Self::new(vec![
            Rail {
                id: RailId::Fednow,
                settlement_class: SettlementClass::Instant,
                min_amount: 1,
                max_amount: 50_000_000,
                requires_instant_eligibility: true,
                enabled: true,
                avg_latency_secs: 60,
                cost: 45,
            },
            Rail {
                id: RailId::Rtp,
                settlement_class: SettlementClass::Instant,
                min_amount: 1,
                max_amount: 100_000_000,
                requires_instant_eligibility: true,
                enabled: true,
                avg_latency_secs: 60,
                cost: 25,
            },
            Rail {
                id: RailId::SameDayAch,
                settlement_class: SettlementClass::SameDay,
                min_amount: 1,
                max_amount: 100_000_000,
                requires_instant_eligibility: false,
                enabled: true,
                avg_latency_secs: 3_600,
                cost: 100,
            },
            Rail {
                id: RailId::StandardAch,
                settlement_class: SettlementClass::Standard,
                min_amount: 1,
                max_amount: 100_000_000,
                requires_instant_eligibility: false,
                enabled: true,
                avg_latency_secs: 86_400,
                cost: 15,
            },
            Rail {
                id: RailId::Wire,
                settlement_class: SettlementClass::Wire,
                min_amount: 100_000,
                max_amount: 10_000_000_000,
                requires_instant_eligibility: false,
                enabled: true,
                avg_latency_secs: 14_400,
                cost: 2_500,
            },
            Rail {
                id: RailId::Stablecoin,
                settlement_class: SettlementClass::Instant,
                min_amount: 1,
                max_amount: 1_000_000_000,
                requires_instant_eligibility: false,
                enabled: false,
                avg_latency_secs: 120,
                cost: 50,
            },
        ])
    }
}

/// Funding-source capability answer from the eligibility collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstantEligibility {
    pub instant_capable: bool,
}
