// SPDX-License-Identifier: AGPL-3.0-only

//! Schnittstelle zu einem succinct Proof-System (Black Box).
//!
//! Aussage: "Ich kenne `claimed` verschiedene Openings, deren Commitments
//! Elemente der Fenstermenge mit Root `root` sind." Das konkrete Beweissystem
//! wird hier bewusst nicht festgelegt.

use crate::budget::{BudgetError, StepBudget};
use crate::Hash32;

/// Feste Proof-Größe im Header-Payload
pub const ZK_PROOF_LEN: usize = 192;

/// Verifikationsschlüssel; wird einmalig (Genesis) fixiert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZkVerifyingKey(pub Vec<u8>);

/// Öffentliche Eingaben
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZkStatement {
    pub root: Hash32,
    pub claimed: u32,
    /// Bindung an den beanspruchenden Header
    pub context: Hash32,
}

#[derive(Clone, Debug)]
pub struct MembershipWitness {
    pub opening: [u8; 32],
    pub height: u64,
    pub prev_hash: Hash32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProverLimits {
    pub constraint_budget: u64,
    pub constraints_per_member: u64,
}

impl ProverLimits {
    pub fn required(&self, members: usize) -> u64 {
        (members as u64).saturating_mul(self.constraints_per_member)
    }

    pub fn check(&self, members: usize) -> Result<(), ZkError> {
        let required = self.required(members);
        if required > self.constraint_budget {
            return Err(ZkError::ConstraintBudgetExceeded { required, budget: self.constraint_budget });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZkError {
    ConstraintBudgetExceeded { required: u64, budget: u64 },
    InvalidWitness(&'static str),
    Budget(BudgetError),
    Backend(String),
}

impl core::fmt::Display for ZkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ConstraintBudgetExceeded { required, budget } => {
                write!(f, "circuit needs {required} constraints, budget is {budget}")
            }
            Self::InvalidWitness(why) => write!(f, "invalid witness: {why}"),
            Self::Budget(e) => write!(f, "{e}"),
            Self::Backend(e) => write!(f, "zk backend: {e}"),
        }
    }
}
impl std::error::Error for ZkError {}
impl From<BudgetError> for ZkError {
    fn from(e: BudgetError) -> Self {
        Self::Budget(e)
    }
}

pub trait ZkProofSystem: Send + Sync {
    fn prove(
        &self,
        statement: &ZkStatement,
        witnesses: &[MembershipWitness],
        window: &[Hash32],
        limits: &ProverLimits,
    ) -> Result<[u8; ZK_PROOF_LEN], ZkError>;

    /// `Ok(false)` = Proof ungültig; `Err(Budget(..))` = abgebrochen/zu teuer.
    fn verify(
        &self,
        vk: &ZkVerifyingKey,
        statement: &ZkStatement,
        proof: &[u8; ZK_PROOF_LEN],
        budget: &StepBudget,
    ) -> Result<bool, ZkError>;
}
