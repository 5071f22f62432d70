use crate::domain::payment::{Amount, Priority};
use crate::domain::rail::{InstantEligibility, Rail, RailCatalog, RailId};
use crate::error::{OrchestratorError, Result};
use std::collections::HashSet;

/// Ranks the rails a payment may be routed over.
///
/// Filters the catalog to enabled rails whose amount bounds admit the
/// payment, excluding already-attempted rails and (for funding sources
/// without instant eligibility) any rail requiring it. Emergency and urgent
/// payments are ordered by settlement speed, standard and batch payments by
/// cost; ties keep catalog declaration order.
///
/// An emergency payment with no eligible instant rail still gets the best
/// available slower rail. An empty result is `NoEligibleRail`, which the
/// caller must treat as a terminal rejection.
pub fn select_rails(
    catalog: &RailCatalog,
    amount: Amount,
    priority: Priority,
    eligibility: InstantEligibility,
    excluded: &HashSet<RailId>,
) -> Result<Vec<Rail>> {
    let mut candidates: Vec<Rail> = catalog
        .iter()
        .filter(|rail| rail.enabled)
        .filter(|rail| rail.accepts_amount(amount.minor_units()))
        .filter(|rail| !excluded.contains(&rail.id))
        .filter(|rail| !rail.requires_instant_eligibility || eligibility.instant_capable)
        .cloned()
        .collect();

    if candidates.is_empty() {
        return Err(OrchestratorError::NoEligibleRail);
    }

    if priority.prefers_speed() {
        candidates.sort_by_key(|rail| rail.settlement_class.speed_rank());
    } else {
        candidates.sort_by_key(|rail| rail.cost);
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(v: u64) -> Amount {
        Amount::new(v).unwrap()
    }

    const ELIGIBLE: InstantEligibility = InstantEligibility {
        instant_capable: true,
    };
    const INELIGIBLE: InstantEligibility = InstantEligibility {
        instant_capable: false,
    };

    #[test]
    fn test_emergency_orders_by_speed() {
        let catalog = RailCatalog::default();
        let rails = select_rails(
            &catalog,
            amount(500),
            Priority::Emergency,
            ELIGIBLE,
            &HashSet::new(),
        )
        .unwrap();

        let ids: Vec<RailId> = rails.iter().map(|r| r.id).collect();
        // Wire is out on min_amount; stablecoin is disabled.
        assert_eq!(
            ids,
            vec![
                RailId::Fednow,
                RailId::Rtp,
                RailId::SameDayAch,
                RailId::StandardAch,
            ]
        );
    }

    #[test]
    fn test_ineligible_source_never_gets_instant() {
        let catalog = RailCatalog::default();
        let rails = select_rails(
            &catalog,
            amount(500),
            Priority::Emergency,
            INELIGIBLE,
            &HashSet::new(),
        )
        .unwrap();

        assert!(rails.iter().all(|r| !r.requires_instant_eligibility));
        // Emergency without instant still gets the fastest remaining rail.
        assert_eq!(rails[0].id, RailId::SameDayAch);
    }

    #[test]
    fn test_standard_orders_by_cost() {
        let catalog = RailCatalog::default();
        let rails = select_rails(
            &catalog,
            amount(500_000),
            Priority::Standard,
            ELIGIBLE,
            &HashSet::new(),
        )
        .unwrap();

        let costs: Vec<u64> = rails.iter().map(|r| r.cost).collect();
        let mut sorted = costs.clone();
        sorted.sort_unstable();
        assert_eq!(costs, sorted);
        assert_eq!(rails[0].id, RailId::StandardAch);
    }

    #[test]
    fn test_excluded_rails_are_skipped() {
        let catalog = RailCatalog::default();
        let excluded: HashSet<RailId> = [RailId::Fednow, RailId::Rtp].into_iter().collect();
        let rails = select_rails(
            &catalog,
            amount(500),
            Priority::Emergency,
            ELIGIBLE,
            &excluded,
        )
        .unwrap();

        assert_eq!(rails[0].id, RailId::SameDayAch);
        assert!(rails.iter().all(|r| !excluded.contains(&r.id)));
    }

    #[test]
    fn test_no_eligible_rail_is_an_error() {
        let catalog = RailCatalog::default();
        let excluded: HashSet<RailId> = catalog.iter().map(|r| r.id).collect();
        let result = select_rails(
            &catalog,
            amount(500),
            Priority::Emergency,
            ELIGIBLE,
            &excluded,
        );
        assert!(matches!(result, Err(OrchestratorError::NoEligibleRail)));
    }

    #[test]
    fn test_tie_break_keeps_declaration_order() {
        // FedNow and RTP share the instant class; declaration order wins.
        let catalog = RailCatalog::default();
        let rails = select_rails(
            &catalog,
            amount(500),
            Priority::Urgent,
            ELIGIBLE,
            &HashSet::new(),
        )
        .unwrap();
        assert_eq!(rails[0].id, RailId::Fednow);
        assert_eq!(rails[1].id, RailId::Rtp);
    }
}
