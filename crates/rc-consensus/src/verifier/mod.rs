// SPDX-License-Identifier: AGPL-3.0-only

//! Variantenabhängige Prüfung von Reputationsbeweisen gegen einen Snapshot.
//!
//! Alle Pfade sind seiteneffektfrei; "bereits gesehen"-Mengen leben nur für
//! die Dauer eines Aufrufs. Parallelität entsteht allein durch mehrere
//! Aufrufe auf unveränderlichen Snapshots.

mod ring;
mod transparent;
mod zk;

use crate::params::ConsensusParams;
use crate::ConsensusError;
use rc_codec::CodecError;
use rc_crypto::{CancelFlag, RingScheme, StepBudget, ZkProofSystem, ZkVerifyingKey};
use rc_ledger::LedgerSnapshot;
use rc_types::{proof_context, BlockHeader, BlockId, Commitment, ReputationProof, ReputationScore, UniquenessTag};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Strukturell ungültige Kodierung
    Malformed(CodecError),
    CommitmentNotInWindow(Commitment),
    OpeningMismatch(Commitment),
    DuplicateCommitment(Commitment),
    RingMemberNotInWindow(Commitment),
    RingSignatureInvalid { record: usize },
    DuplicateUniquenessTag(UniquenessTag),
    MalformedRing { record: usize, reason: &'static str },
    WindowRootMismatch,
    ZkProofInvalid,
    ReputationMismatch { claimed: u32, verified: u32 },
    WindowUnderflow { window_len: usize, claimed: u32 },
    ClaimExceedsWindow { claimed: u32, window: usize },
    /// Header erweitert nicht den Snapshot-Tip
    ContextMismatch { height: u64, parent: BlockId },
    Timeout,
    Backend(String),
}

impl VerifyError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl core::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed header: {e}"),
            Self::CommitmentNotInWindow(c) => write!(f, "commitment {c} not in window"),
            Self::OpeningMismatch(c) => write!(f, "opening does not match commitment {c}"),
            Self::DuplicateCommitment(c) => write!(f, "commitment {c} repeated in proof"),
            Self::RingMemberNotInWindow(c) => write!(f, "ring member {c} not in window"),
            Self::RingSignatureInvalid { record } => write!(f, "ring signature {record} invalid"),
            Self::DuplicateUniquenessTag(t) => {
                write!(f, "uniqueness tag {} repeated in proof", hex::encode(t.0))
            }
            Self::MalformedRing { record, reason } => write!(f, "ring {record} malformed: {reason}"),
            Self::WindowRootMismatch => write!(f, "proof root differs from window root"),
            Self::ZkProofInvalid => write!(f, "zk proof invalid"),
            Self::ReputationMismatch { claimed, verified } => {
                write!(f, "claimed reputation {claimed}, verified {verified}")
            }
            Self::WindowUnderflow { window_len, claimed } => {
                write!(f, "window holds {window_len} entries, cannot back claim {claimed}")
            }
            Self::ClaimExceedsWindow { claimed, window } => {
                write!(f, "claim {claimed} exceeds window size {window}")
            }
            Self::ContextMismatch { height, parent } => {
                write!(f, "header {height} on {parent} does not extend snapshot tip")
            }
            Self::Timeout => write!(f, "verification timed out"),
            Self::Backend(e) => write!(f, "primitive backend: {e}"),
        }
    }
}
impl std::error::Error for VerifyError {}

impl From<CodecError> for VerifyError {
    fn from(e: CodecError) -> Self {
        Self::Malformed(e)
    }
}

/// Prüfer mit festem Ring-/ZK-Backend und fixiertem Verifikationsschlüssel.
pub struct ProofVerifier<S, Z> {
    params: ConsensusParams,
    ring: S,
    zk: Z,
    vk: ZkVerifyingKey,
}

impl<S: RingScheme, Z: ZkProofSystem> ProofVerifier<S, Z> {
    pub fn new(params: ConsensusParams, ring: S, zk: Z, vk: ZkVerifyingKey) -> Result<Self, ConsensusError> {
        params.validate()?;
        Ok(Self { params, ring, zk, vk })
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn ring_scheme(&self) -> &S {
        &self.ring
    }

    pub fn zk_system(&self) -> &Z {
        &self.zk
    }

    pub fn verify(
        &self,
        proof: Option<&ReputationProof>,
        snapshot: &LedgerSnapshot,
    ) -> Result<ReputationScore, VerifyError> {
        self.verify_with_cancel(proof, snapshot, &CancelFlag::new())
    }

    /// Wie `verify`; `cancel` bricht laufende Prüfungen mit `Timeout` ab.
    pub fn verify_with_cancel(
        &self,
        proof: Option<&ReputationProof>,
        snapshot: &LedgerSnapshot,
        cancel: &CancelFlag,
    ) -> Result<ReputationScore, VerifyError> {
        let Some(proof) = proof else {
            return Ok(ReputationScore::ZERO);
        };
        let res = self.dispatch(proof, snapshot, cancel);
        if let Err(e) = &res {
            debug!(
                variant = %proof.variant(),
                claimed = proof.claimed_reputation(),
                tip = %snapshot.tip_id(),
                error = %e,
                "proof rejected"
            );
        }
        res
    }

    pub fn verify_header(
        &self,
        header: &BlockHeader,
        snapshot: &LedgerSnapshot,
    ) -> Result<ReputationScore, VerifyError> {
        self.verify_header_with_cancel(header, snapshot, &CancelFlag::new())
    }

    pub fn verify_header_with_cancel(
        &self,
        header: &BlockHeader,
        snapshot: &LedgerSnapshot,
        cancel: &CancelFlag,
    ) -> Result<ReputationScore, VerifyError> {
        if header.height != snapshot.next_height() || header.prev_hash != snapshot.tip_id() {
            return Err(VerifyError::ContextMismatch { height: header.height, parent: header.prev_hash });
        }
        self.verify_with_cancel(header.proof.as_ref(), snapshot, cancel)
    }

    fn dispatch(
        &self,
        proof: &ReputationProof,
        snapshot: &LedgerSnapshot,
        cancel: &CancelFlag,
    ) -> Result<ReputationScore, VerifyError> {
        let claimed = proof.claimed_reputation();
        let window = snapshot.window_size();
        if claimed as usize > window {
            return Err(VerifyError::ClaimExceedsWindow { claimed, window });
        }
        if snapshot.is_underflow() {
            if claimed == 0 {
                return Ok(ReputationScore::ZERO);
            }
            return Err(VerifyError::WindowUnderflow { window_len: snapshot.window_len(), claimed });
        }
        let context = proof_context(snapshot.next_height(), &snapshot.tip_id());
        let verified = match proof {
            ReputationProof::Transparent(p) => transparent::verify(p, snapshot, cancel)?,
            ReputationProof::RingSignature(p) => {
                ring::verify(&self.ring, p, snapshot, self.params.min_ring_size, &context, cancel)?
            }
            ReputationProof::ZeroKnowledge(p) => {
                let budget = StepBudget::new(self.params.zk_step_budget, cancel.clone());
                zk::verify(&self.zk, &self.vk, p, snapshot, &context, &budget)?
            }
        };
        Ok(ReputationScore(verified))
    }
}

/// Anzahl Einträge muss exakt der Claim sein (Über- und Unterzählung).
fn check_count(claimed: u32, items: usize) -> Result<(), VerifyError> {
    let verified = u32::try_from(items).unwrap_or(u32::MAX);
    if verified != claimed {
        return Err(VerifyError::ReputationMismatch { claimed, verified });
    }
    Ok(())
}

fn check_cancel(cancel: &CancelFlag) -> Result<(), VerifyError> {
    if cancel.is_cancelled() {
        return Err(VerifyError::Timeout);
    }
    Ok(())
}
