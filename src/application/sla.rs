use crate::application::orchestrator::PaymentOrchestrator;
use crate::domain::ports::{AlertSinkRef, Escalation, EscalationKind, PaymentStoreRef};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct SlaMonitorConfig {
    /// Pause between sweeps.
    pub sweep_interval: Duration,
    /// Fraction of the original window below which a payment escalates.
    pub escalation_threshold: f64,
}

impl Default for SlaMonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(30),
            escalation_threshold: 0.25,
        }
    }
}

/// Counts from one sweep, mostly for tests and operator logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub escalated: usize,
    pub breached: usize,
}

/// Periodic watchdog over in-flight payments with an SLA deadline.
///
/// A payment below the escalation threshold is flagged once and reported to
/// the alerting collaborator; failover then prefers the fastest remaining
/// rail. A payment past its deadline is flagged breached and reported, but
/// keeps processing: a late success beats an abandoned payment.
pub struct SlaMonitor {
    orchestrator: Arc<PaymentOrchestrator>,
    store: PaymentStoreRef,
    alerts: AlertSinkRef,
    config: SlaMonitorConfig,
}

impl SlaMonitor {
    pub fn new(
        orchestrator: Arc<PaymentOrchestrator>,
        store: PaymentStoreRef,
        alerts: AlertSinkRef,
        config: SlaMonitorConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            alerts,
            config,
        }
    }

    /// One pass over every non-terminal payment carrying a deadline.
    pub async fn sweep(&self) -> SweepStats {
        let payments = match self.store.non_terminal_with_deadline().await {
            Ok(payments) => payments,
            Err(e) => {
                error!(error = %e, "SLA sweep could not read the store");
                return SweepStats::default();
            }
        };

        let mut stats = SweepStats {
            scanned: payments.len(),
            ..SweepStats::default()
        };
        let now = Utc::now();

        for payment in payments {
            let Some(deadline) = payment.sla_deadline else {
                continue;
            };

            if now >= deadline {
                if payment.sla_breached {
                    continue;
                }
                match self
                    .orchestrator
                    .flag_sla(payment.id, EscalationKind::Breached)
                    .await
                {
                    Ok(Some(updated)) => {
                        stats.breached += 1;
                        warn!(
                            payment_id = %updated.id,
                            correlation_id = %updated.correlation_id,
                            %deadline,
                            "SLA deadline breached while payment in flight"
                        );
                        self.alerts
                            .notify(Escalation {
                                payment_id: updated.id,
                                correlation_id: updated.correlation_id,
                                kind: EscalationKind::Breached,
                                deadline,
                            })
                            .await;
                    }
                    Ok(None) => {}
                    Err(e) => error!(payment_id = %payment.id, error = %e, "failed to flag breach"),
                }
                continue;
            }

            if payment.escalated {
                continue;
            }
            let window = (deadline - payment.created_at).num_milliseconds().max(1) as f64;
            let remaining = (deadline - now).num_milliseconds().max(0) as f64;
            if remaining / window <= self.config.escalation_threshold {
                match self
                    .orchestrator
                    .flag_sla(payment.id, EscalationKind::AtRisk)
                    .await
                {
                    Ok(Some(updated)) => {
                        stats.escalated += 1;
                        info!(
                            payment_id = %updated.id,
                            correlation_id = %updated.correlation_id,
                            %deadline,
                            "payment at risk of SLA breach, escalating"
                        );
                        self.alerts
                            .notify(Escalation {
                                payment_id: updated.id,
                                correlation_id: updated.correlation_id,
                                kind: EscalationKind::AtRisk,
                                deadline,
                            })
                            .await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(payment_id = %payment.id, error = %e, "failed to flag escalation")
                    }
                }
            }
        }

        stats
    }

    /// Background loop sweeping on a fixed interval until aborted.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.sweep().await;
        }
    }
}
