// SPDX-License-Identifier: AGPL-3.0-only

//! Reputationsgewichtete Fork-Choice.
//!
//! Weight = Σ difficulty × (1 + α·rep) mit α = num/den, exakt skaliert:
//! W' = Σ difficulty × (den + num·rep) = den · Weight (u128, kein Rundungsfehler).

use crate::consts::{REP_ALPHA_DEN, REP_ALPHA_NUM};
use crate::params::ConsensusParams;
use crate::verifier::VerifyError;
use crate::ConsensusError;
use rc_types::{BlockId, ReputationScore};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForkChoiceError {
    NoViableCandidate,
}

impl core::fmt::Display for ForkChoiceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoViableCandidate => write!(f, "no viable candidate chain"),
        }
    }
}
impl std::error::Error for ForkChoiceError {}

/// Ergebnis der Prüfung eines Blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    Verified(ReputationScore),
    Invalid(VerifyError),
    TimedOut,
}

impl From<Result<ReputationScore, VerifyError>> for BlockStatus {
    fn from(res: Result<ReputationScore, VerifyError>) -> Self {
        match res {
            Ok(score) => Self::Verified(score),
            Err(VerifyError::Timeout) => Self::TimedOut,
            Err(e) => Self::Invalid(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockScore {
    pub id: BlockId,
    pub height: u64,
    pub difficulty: u64,
    pub status: BlockStatus,
}

/// Kandidat: Blöcke ab einem gemeinsamen Ausgangspunkt bis `tip`, aufsteigend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainCandidate {
    pub tip: BlockId,
    pub blocks: Vec<BlockScore>,
}

impl ChainCandidate {
    pub fn status(&self) -> CandidateStatus {
        for b in &self.blocks {
            match &b.status {
                BlockStatus::Verified(_) => {}
                BlockStatus::Invalid(e) => {
                    return CandidateStatus::Disqualified { height: b.height, reason: e.clone() }
                }
                BlockStatus::TimedOut => return CandidateStatus::TimedOut { height: b.height },
            }
        }
        CandidateStatus::Viable
    }

    pub fn tip_height(&self) -> Option<u64> {
        self.blocks.last().map(|b| b.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateStatus {
    Viable,
    Disqualified { height: u64, reason: VerifyError },
    TimedOut { height: u64 },
}

/// Gewählte kanonische Kette
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainView {
    pub tip: BlockId,
    pub tip_height: Option<u64>,
    /// Skaliertes Gewicht (× alpha_den) des divergenten Suffixes
    pub weight: u128,
    pub candidate_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkChoiceEngine {
    alpha_num: u32,
    alpha_den: u32,
}

impl Default for ForkChoiceEngine {
    fn default() -> Self {
        Self { alpha_num: REP_ALPHA_NUM, alpha_den: REP_ALPHA_DEN }
    }
}

impl ForkChoiceEngine {
    pub fn new(alpha_num: u32, alpha_den: u32) -> Result<Self, ConsensusError> {
        if alpha_den == 0 {
            return Err(ConsensusError::InvalidParams("alpha_den"));
        }
        Ok(Self { alpha_num, alpha_den })
    }

    pub fn from_params(params: &ConsensusParams) -> Result<Self, ConsensusError> {
        Self::new(params.alpha_num, params.alpha_den)
    }

    #[inline]
    pub fn block_weight(&self, difficulty: u64, reputation: ReputationScore) -> u128 {
        let factor = self.alpha_den as u128 + self.alpha_num as u128 * reputation.get() as u128;
        (difficulty as u128).saturating_mul(factor)
    }

    /// Gewicht der Blöcke außerhalb von `common`; None wenn nicht verwertbar.
    fn suffix_weight(&self, c: &ChainCandidate, common: &HashSet<BlockId>) -> Option<u128> {
        let mut w: u128 = 0;
        for b in c.blocks.iter().filter(|b| !common.contains(&b.id)) {
            match b.status {
                BlockStatus::Verified(rep) => w = w.saturating_add(self.block_weight(b.difficulty, rep)),
                _ => return None,
            }
        }
        Some(w)
    }

    pub fn chain_weight(&self, candidate: &ChainCandidate) -> Option<u128> {
        if candidate.status() != CandidateStatus::Viable {
            return None;
        }
        self.suffix_weight(candidate, &HashSet::new())
    }

    /// Strikt größtes Gewicht; bei Gleichstand gewinnt die kleinere Tip-Id.
    pub fn select(&self, candidates: &[ChainCandidate]) -> Result<ChainView, ForkChoiceError> {
        let common = common_prefix(candidates);
        let mut best: Option<ChainView> = None;
        for (i, c) in candidates.iter().enumerate() {
            let status = c.status();
            if status != CandidateStatus::Viable {
                debug!(tip = %c.tip, ?status, "candidate excluded");
                continue;
            }
            let Some(weight) = self.suffix_weight(c, &common) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some(b) => weight > b.weight || (weight == b.weight && c.tip < b.tip),
            };
            if better {
                best = Some(ChainView { tip: c.tip, tip_height: c.tip_height(), weight, candidate_index: i });
            }
        }
        let view = best.ok_or(ForkChoiceError::NoViableCandidate)?;
        debug!(tip = %view.tip, weight = view.weight, candidates = candidates.len(), "fork choice");
        Ok(view)
    }
}

/// Blöcke, die in allen Kandidaten vorkommen (gemeinsamer Vorfahren-Präfix).
fn common_prefix(candidates: &[ChainCandidate]) -> HashSet<BlockId> {
    let mut it = candidates.iter();
    let Some(first) = it.next() else {
        return HashSet::new();
    };
    let mut common: HashSet<BlockId> = first.blocks.iter().map(|b| b.id).collect();
    for c in it {
        let ids: HashSet<BlockId> = c.blocks.iter().map(|b| b.id).collect();
        common.retain(|id| ids.contains(id));
    }
    common
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(tag: u8, n: u64) -> BlockId {
        let mut b = [tag; 32];
        b[..8].copy_from_slice(&n.to_le_bytes());
        BlockId(b)
    }

    fn uniform(tag: u8, from: u64, len: u64, rep: u32) -> Vec<BlockScore> {
        (from..from + len)
            .map(|h| BlockScore {
                id: id(tag, h),
                height: h,
                difficulty: 1,
                status: BlockStatus::Verified(ReputationScore(rep)),
            })
            .collect()
    }

    fn candidate(blocks: Vec<BlockScore>) -> ChainCandidate {
        let tip = blocks.last().map(|b| b.id).unwrap_or_default();
        ChainCandidate { tip, blocks }
    }

    fn engine() -> ForkChoiceEngine {
        ForkChoiceEngine::from_params(&ConsensusParams::recommended()).unwrap()
    }

    #[test]
    fn reputation_outweighs_longer_chain() {
        // 1000 × (1 + 0.4·50) = 21000 gegen 1020 × 1 = 1020
        let reputable = candidate(uniform(1, 1, 1000, 50));
        let long = candidate(uniform(2, 1, 1020, 0));
        let e = engine();
        assert_eq!(e.chain_weight(&reputable), Some(21_000 * 10));
        assert_eq!(e.chain_weight(&long), Some(1_020 * 10));
        let view = e.select(&[long, reputable.clone()]).unwrap();
        assert_eq!(view.tip, reputable.tip);
        assert_eq!(view.candidate_index, 1);
        assert_eq!(view.tip_height, Some(1000));
    }

    #[test]
    fn tie_goes_to_smallest_tip() {
        let a = candidate(uniform(9, 1, 5, 1));
        let b = candidate(uniform(3, 1, 5, 1));
        let e = engine();
        assert_eq!(e.select(&[a.clone(), b.clone()]).unwrap().tip, b.tip);
        assert_eq!(e.select(&[b.clone(), a]).unwrap().tip, b.tip);
    }

    #[test]
    fn invalid_block_disqualifies_whole_chain() {
        let mut heavy = uniform(1, 1, 10, 100);
        if let Some(b) = heavy.get_mut(3) {
            b.status = BlockStatus::Invalid(VerifyError::ZkProofInvalid);
        }
        let heavy = candidate(heavy);
        let light = candidate(uniform(2, 1, 2, 0));
        let e = engine();
        assert!(matches!(heavy.status(), CandidateStatus::Disqualified { height: 4, .. }));
        assert_eq!(e.chain_weight(&heavy), None);
        assert_eq!(e.select(&[heavy, light.clone()]).unwrap().tip, light.tip);
    }

    #[test]
    fn no_viable_candidate() {
        let mut blocks = uniform(1, 1, 2, 0);
        if let Some(b) = blocks.last_mut() {
            b.status = BlockStatus::TimedOut;
        }
        let timed_out = candidate(blocks);
        assert_eq!(timed_out.status(), CandidateStatus::TimedOut { height: 2 });
        assert_eq!(engine().select(&[timed_out]), Err(ForkChoiceError::NoViableCandidate));
        assert_eq!(engine().select(&[]), Err(ForkChoiceError::NoViableCandidate));
    }

    #[test]
    fn only_divergent_suffix_is_weighed() {
        let shared = uniform(7, 1, 20, 5);
        let mut a = shared.clone();
        a.extend(uniform(1, 21, 2, 0));
        let mut b = shared;
        b.extend(uniform(2, 21, 1, 3));
        let e = engine();
        let view = e.select(&[candidate(a), candidate(b.clone())]).unwrap();
        // a: 2 × 10 = 20, b: 1 × (10 + 12) = 22
        assert_eq!(view.tip, candidate(b).tip);
        assert_eq!(view.weight, 22);
    }

    #[test]
    fn verify_results_map_to_status() {
        assert_eq!(BlockStatus::from(Ok(ReputationScore(2))), BlockStatus::Verified(ReputationScore(2)));
        assert_eq!(BlockStatus::from(Err(VerifyError::Timeout)), BlockStatus::TimedOut);
        assert_eq!(
            BlockStatus::from(Err(VerifyError::WindowRootMismatch)),
            BlockStatus::Invalid(VerifyError::WindowRootMismatch)
        );
    }

    #[test]
    fn zero_alpha_den_rejected() {
        assert_eq!(ForkChoiceEngine::new(1, 0), Err(ConsensusError::InvalidParams("alpha_den")));
    }

    proptest! {
        #[test]
        fn selection_is_order_independent(reps in proptest::collection::vec(0u32..50, 1..6)) {
            let cands: Vec<ChainCandidate> = reps
                .iter()
                .enumerate()
                .map(|(i, r)| candidate(uniform(i as u8 + 1, 1, 3, *r)))
                .collect();
            let e = engine();
            let fwd = e.select(&cands).unwrap();
            let mut rev = cands.clone();
            rev.reverse();
            prop_assert_eq!(fwd.tip, e.select(&rev).unwrap().tip);
        }
    }
}
