//! 原因码权重与分数 → 状态映射

use std::collections::{BTreeMap, BTreeSet};

use crate::config::FraudConfig;
use crate::storage::{FraudState, ReasonCode};

/// 静态权重表，未配置的原因码权重为 0
#[derive(Debug, Clone)]
pub struct ReasonWeights {
    weights: BTreeMap<ReasonCode, u32>,
}

impl ReasonWeights {
    pub fn from_config(config: &FraudConfig) -> Self {
        let weights = config
            .weights
            .iter()
            .filter_map(|(name, weight)| match name.parse::<ReasonCode>() {
                Ok(code) => Some((code, *weight)),
                Err(_) => {
                    tracing::warn!("Ignoring weight for unknown reason code '{}'", name);
                    None
                }
            })
            .collect();
        Self { weights }
    }

    pub fn weight(&self, code: ReasonCode) -> u32 {
        self.weights.get(&code).copied().unwrap_or(0)
    }

    pub fn score(&self, codes: &BTreeSet<ReasonCode>) -> u32 {
        codes
            .iter()
            .fold(0u32, |acc, code| acc.saturating_add(self.weight(*code)))
    }
}

/// score < T1 → clean，T1 ≤ score < T2 → suspect，score ≥ T2 → blocked
pub fn state_for_score(score: u32, suspect_threshold: u32, block_threshold: u32) -> FraudState {
    if score >= block_threshold {
        FraudState::Blocked
    } else if score >= suspect_threshold {
        FraudState::Suspect
    } else {
        FraudState::Clean
    }
}
