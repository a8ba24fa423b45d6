use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::RwLock;

use crate::models::{Alert, AlertType};

/// How repeated breaches of the same condition are raised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMode {
    /// Raise on every tick the condition holds
    #[default]
    Continuous,
    /// Raise only when a condition goes from healthy to breached
    EdgeTriggered,
}

/// Alerts admitted for one tick plus the breach state to commit afterwards
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub alerts: Vec<Alert>,
    breached: HashSet<AlertType>,
}

/// Filters candidate alerts according to the configured mode.
///
/// Edge state is only advanced by [`AlertGate::commit`], so a tick whose
/// alerts failed to persist will raise them again next time.
pub struct AlertGate {
    mode: AlertMode,
    breached: RwLock<HashSet<AlertType>>,
}

impl AlertGate {
    pub fn new(mode: AlertMode) -> Self {
        Self {
            mode,
            breached: RwLock::new(HashSet::new()),
        }
    }

    pub fn mode(&self) -> AlertMode {
        self.mode
    }

    pub fn decide(&self, candidates: Vec<Alert>) -> GateDecision {
        let breached: HashSet<AlertType> = candidates.iter().map(|a| a.alert_type).collect();

        let alerts = match self.mode {
            AlertMode::Continuous => candidates,
            AlertMode::EdgeTriggered => {
                let previous = self
                    .breached
                    .read()
                    .map(|set| set.clone())
                    .unwrap_or_default();
                candidates
                    .into_iter()
                    .filter(|a| !previous.contains(&a.alert_type))
                    .collect()
            }
        };

        GateDecision { alerts, breached }
    }

    pub fn commit(&self, decision: &GateDecision) {
        if let Ok(mut breached) = self.breached.write() {
            *breached = decision.breached.clone();
        }
    }
}
