// SPDX-License-Identifier: AGPL-3.0-only
#![forbid(unsafe_code)]
#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]

//! Reputationsgewichteter Konsens für PoW-Ketten: Secrets, Proof-Aufbau,
//! Proof-Prüfung und Fork-Choice.

pub mod builder;
pub mod consts;
pub mod fork_choice;
pub mod params;
pub mod secret;
pub mod verifier;

pub use builder::{BuildError, ProofBuilder, ProofRequest};
pub use fork_choice::{
    BlockScore, BlockStatus, CandidateStatus, ChainCandidate, ChainView, ForkChoiceEngine,
    ForkChoiceError,
};
pub use params::ConsensusParams;
pub use secret::{derive_secret, OwnedOpening, SecretDeriver};
pub use verifier::{ProofVerifier, VerifyError};

use rc_codec::decode_exact;
use rc_crypto::{RingScheme, ZkProofSystem};
use rc_ledger::{CommitmentLedger, LedgerError, LedgerSnapshot};
use rc_types::{BlockHeader, ReputationScore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    InvalidParams(&'static str),
}

impl core::fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidParams(field) => write!(f, "invalid consensus params: {field}"),
        }
    }
}
impl std::error::Error for ConsensusError {}

/// Dekodiert einen Header; Strukturfehler werden als `Malformed` gemeldet.
pub fn decode_header(bytes: &[u8]) -> Result<BlockHeader, VerifyError> {
    Ok(decode_exact::<BlockHeader>(bytes)?)
}

/// Verifizierter Score eines Headers, der den Snapshot-Tip erweitert.
pub fn verify_reputation<S: RingScheme, Z: ZkProofSystem>(
    verifier: &ProofVerifier<S, Z>,
    header: &BlockHeader,
    snapshot: &LedgerSnapshot,
) -> Result<ReputationScore, VerifyError> {
    verifier.verify_header(header, snapshot)
}

/// Fork-Choice mit dem α der Engine (`ForkChoiceEngine::from_params` für die Config).
pub fn fork_choice(engine: &ForkChoiceEngine, candidates: &[ChainCandidate]) -> Result<ChainView, ForkChoiceError> {
    engine.select(candidates)
}

/// Neues Ledger mit angehängtem Header; `ledger` bleibt unverändert.
pub fn ledger_append(ledger: &CommitmentLedger, header: &BlockHeader) -> Result<CommitmentLedger, LedgerError> {
    let mut next = ledger.clone();
    next.append(header)?;
    Ok(next)
}

pub fn ledger_fork_at(ledger: &CommitmentLedger, height: u64) -> Result<CommitmentLedger, LedgerError> {
    ledger.fork_at(height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_codec::{encode_to_vec, CodecError};
    use rc_ledger::LedgerParams;
    use rc_types::{BlockId, Commitment};

    #[test]
    fn ledger_append_is_persistent() {
        let l0 = CommitmentLedger::genesis(LedgerParams::new(4, 4).unwrap());
        let h = BlockHeader {
            height: 0,
            prev_hash: BlockId::default(),
            commitment: Commitment([1u8; 32]),
            difficulty: 1,
            proof: None,
        };
        let l1 = ledger_append(&l0, &h).unwrap();
        assert_eq!(l0.next_height(), 0);
        assert_eq!(l1.next_height(), 1);
        assert_eq!(ledger_append(&l1, &h).err(), Some(LedgerError::WindowCorrupt { expected: 1, got: 0 }));
        let forked = ledger_fork_at(&l1, 0).unwrap();
        assert_eq!(forked.tip_id(), h.id().unwrap());
    }

    #[test]
    fn fork_choice_uses_configured_alpha() {
        let block = |tag: u8, rep: u32| BlockScore {
            id: BlockId([tag; 32]),
            height: 1,
            difficulty: 1,
            status: BlockStatus::Verified(ReputationScore(rep)),
        };
        let candidates = vec![
            ChainCandidate { tip: BlockId([1u8; 32]), blocks: vec![block(1, 2)] },
            ChainCandidate { tip: BlockId([2u8; 32]), blocks: vec![block(2, 0), block(3, 0)] },
        ];
        // α = 4/10: 10 + 8 = 18 gegen 20
        let default = fork_choice(&ForkChoiceEngine::default(), &candidates).unwrap();
        assert_eq!((default.candidate_index, default.weight), (1, 20));
        let params = ConsensusParams { alpha_num: 1, alpha_den: 1, ..ConsensusParams::recommended() };
        let engine = ForkChoiceEngine::from_params(&params).unwrap();
        // α = 1: 1 + 2 = 3 gegen 2
        let strong = fork_choice(&engine, &candidates).unwrap();
        assert_eq!((strong.candidate_index, strong.weight), (0, 3));
    }

    #[test]
    fn decode_header_reports_malformed() {
        let h = BlockHeader {
            height: 3,
            prev_hash: BlockId([2u8; 32]),
            commitment: Commitment([5u8; 32]),
            difficulty: 9,
            proof: None,
        };
        let mut buf = encode_to_vec(&h).unwrap();
        assert_eq!(decode_header(&buf), Ok(h));
        buf.push(0);
        assert_eq!(decode_header(&buf), Err(VerifyError::Malformed(CodecError::TrailingBytes(1))));
        if let Some(tag) = buf.get_mut(80) {
            *tag = 9;
        }
        assert_eq!(decode_header(&buf), Err(VerifyError::Malformed(CodecError::InvalidTag(9))));
    }
}
