// SPDX-License-Identifier: AGPL-3.0-only

use crate::consts::*;
use crate::ConsensusError;
use anyhow::{anyhow, Context};
use rc_crypto::ProverLimits;
use rc_ledger::LedgerParams;
use rc_types::MAX_RING_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Netzweite Konsensparameter. Fehlende TOML-Felder fallen auf die
/// empfohlenen Werte zurück.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_alpha_num")]
    pub alpha_num: u32,
    #[serde(default = "default_alpha_den")]
    pub alpha_den: u32,
    #[serde(default = "default_ring_size")]
    pub ring_size: usize,
    #[serde(default = "default_min_ring_size")]
    pub min_ring_size: usize,
    #[serde(default = "default_max_fork_depth")]
    pub max_fork_depth: usize,
    #[serde(default = "default_zk_step_budget")]
    pub zk_step_budget: u64,
    #[serde(default = "default_zk_constraints_per_member")]
    pub zk_constraints_per_member: u64,
    #[serde(default = "default_zk_constraint_budget")]
    pub zk_constraint_budget: u64,
    #[serde(default = "default_verify_timeout_ms")]
    pub verify_timeout_ms: u64,
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}
fn default_alpha_num() -> u32 {
    REP_ALPHA_NUM
}
fn default_alpha_den() -> u32 {
    REP_ALPHA_DEN
}
fn default_ring_size() -> usize {
    DEFAULT_RING_SIZE
}
fn default_min_ring_size() -> usize {
    MIN_RING_SIZE
}
fn default_max_fork_depth() -> usize {
    DEFAULT_MAX_FORK_DEPTH
}
fn default_zk_step_budget() -> u64 {
    ZK_STEP_BUDGET
}
fn default_zk_constraints_per_member() -> u64 {
    ZK_CONSTRAINTS_PER_MEMBER
}
fn default_zk_constraint_budget() -> u64 {
    ZK_CONSTRAINT_BUDGET
}
fn default_verify_timeout_ms() -> u64 {
    VERIFY_TIMEOUT_MS
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self::recommended()
    }
}

impl ConsensusParams {
    pub fn recommended() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            alpha_num: REP_ALPHA_NUM,
            alpha_den: REP_ALPHA_DEN,
            ring_size: DEFAULT_RING_SIZE,
            min_ring_size: MIN_RING_SIZE,
            max_fork_depth: DEFAULT_MAX_FORK_DEPTH,
            zk_step_budget: ZK_STEP_BUDGET,
            zk_constraints_per_member: ZK_CONSTRAINTS_PER_MEMBER,
            zk_constraint_budget: ZK_CONSTRAINT_BUDGET,
            verify_timeout_ms: VERIFY_TIMEOUT_MS,
        }
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        // Claims sind u32 auf dem Draht
        if self.window_size == 0 || self.window_size > u32::MAX as usize {
            return Err(ConsensusError::InvalidParams("window_size"));
        }
        if self.alpha_den == 0 {
            return Err(ConsensusError::InvalidParams("alpha_den"));
        }
        if self.min_ring_size < MIN_RING_SIZE {
            return Err(ConsensusError::InvalidParams("min_ring_size"));
        }
        if self.ring_size < self.min_ring_size || self.ring_size > MAX_RING_SIZE {
            return Err(ConsensusError::InvalidParams("ring_size"));
        }
        if self.zk_step_budget == 0 {
            return Err(ConsensusError::InvalidParams("zk_step_budget"));
        }
        if self.zk_constraints_per_member == 0 {
            return Err(ConsensusError::InvalidParams("zk_constraints_per_member"));
        }
        if self.verify_timeout_ms == 0 {
            return Err(ConsensusError::InvalidParams("verify_timeout_ms"));
        }
        Ok(())
    }

    pub fn ledger_params(&self) -> Result<LedgerParams, ConsensusError> {
        LedgerParams::new(self.window_size, self.max_fork_depth)
            .map_err(|_| ConsensusError::InvalidParams("window_size"))
    }

    pub fn prover_limits(&self) -> ProverLimits {
        ProverLimits {
            constraint_budget: self.zk_constraint_budget,
            constraints_per_member: self.zk_constraints_per_member,
        }
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }

    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let params: Self = toml::from_str(raw).map_err(|e| anyhow!("parse consensus params: {e}"))?;
        params.validate().map_err(|e| anyhow!("{e}"))?;
        Ok(params)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read consensus params {}", path.display()))?;
        Self::from_toml_str(&raw)
    }
}
