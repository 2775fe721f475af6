// SPDX-License-Identifier: AGPL-3.0-only

//! Miner-seitiger Aufbau von Reputationsbeweisen gegen einen Fenster-Snapshot.

use crate::params::ConsensusParams;
use crate::secret::OwnedOpening;
use rand::seq::SliceRandom;
use rand::Rng;
use rc_crypto::{
    Hash32, MembershipWitness, RingError, RingScheme, RingSigner, ZkError, ZkProofSystem,
    ZkStatement,
};
use rc_ledger::LedgerSnapshot;
use rc_types::{
    proof_context, BlockId, Commitment, Opening, ProofVariant, ReputationProof, RevealedPair,
    RingProof, RingRecord, TransparentProof, UniquenessTag, ZkReputationProof,
};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    InsufficientOpenings { available: usize, requested: u32 },
    InsufficientDecoys { needed: usize, available: usize },
    ConstraintBudgetExceeded { required: u64, budget: u64 },
    Ring(RingError),
    Zk(ZkError),
}

impl core::fmt::Display for BuildError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InsufficientOpenings { available, requested } => {
                write!(f, "only {available} usable openings, {requested} requested")
            }
            Self::InsufficientDecoys { needed, available } => {
                write!(f, "ring needs {needed} decoys, only {available} available")
            }
            Self::ConstraintBudgetExceeded { required, budget } => {
                write!(f, "circuit needs {required} constraints, budget is {budget}")
            }
            Self::Ring(e) => write!(f, "ring signing failed: {e}"),
            Self::Zk(e) => write!(f, "zk proving failed: {e}"),
        }
    }
}
impl std::error::Error for BuildError {}

impl From<RingError> for BuildError {
    fn from(e: RingError) -> Self {
        Self::Ring(e)
    }
}
impl From<ZkError> for BuildError {
    fn from(e: ZkError) -> Self {
        match e {
            ZkError::ConstraintBudgetExceeded { required, budget } => {
                Self::ConstraintBudgetExceeded { required, budget }
            }
            other => Self::Zk(other),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProofRequest {
    pub variant: ProofVariant,
    pub claim: u32,
}

/// Ein im Fenster nachgewiesenes eigenes Commitment
#[derive(Clone, Copy, Debug)]
struct Usable {
    height: u64,
    opening: Opening,
    prev_hash: BlockId,
    commitment: Commitment,
}

pub struct ProofBuilder<'a, S: ?Sized, Z: ?Sized> {
    params: &'a ConsensusParams,
    ring: &'a S,
    zk: &'a Z,
}

impl<'a, S, Z> ProofBuilder<'a, S, Z>
where
    S: RingScheme + ?Sized,
    Z: ZkProofSystem + ?Sized,
{
    pub fn new(params: &'a ConsensusParams, ring: &'a S, zk: &'a Z) -> Self {
        Self { params, ring, zk }
    }

    /// Baut einen Proof für einen Header, der den Snapshot-Tip erweitert.
    pub fn build<G: Rng + ?Sized>(
        &self,
        owned: &[OwnedOpening],
        snapshot: &LedgerSnapshot,
        request: ProofRequest,
        rng: &mut G,
    ) -> Result<ReputationProof, BuildError> {
        let usable = usable_openings(owned, snapshot);
        let k = request.claim as usize;
        if usable.len() < k {
            return Err(BuildError::InsufficientOpenings {
                available: usable.len(),
                requested: request.claim,
            });
        }
        let chosen = usable.get(..k).unwrap_or(&[]);
        let context = proof_context(snapshot.next_height(), &snapshot.tip_id());
        let proof = match request.variant {
            ProofVariant::Transparent => ReputationProof::Transparent(TransparentProof {
                claimed_reputation: request.claim,
                pairs: chosen
                    .iter()
                    .map(|u| RevealedPair { commitment: u.commitment, opening: u.opening })
                    .collect(),
            }),
            ProofVariant::RingSignature => {
                let records = self.build_rings(chosen, snapshot, &context, rng)?;
                ReputationProof::RingSignature(RingProof { claimed_reputation: request.claim, records })
            }
            ProofVariant::ZeroKnowledge => {
                ReputationProof::ZeroKnowledge(self.build_zk(chosen, snapshot, request.claim, context)?)
            }
        };
        debug!(variant = %request.variant, claim = request.claim, usable = usable.len(), "proof built");
        Ok(proof)
    }

    fn build_rings<G: Rng + ?Sized>(
        &self,
        chosen: &[Usable],
        snapshot: &LedgerSnapshot,
        context: &Hash32,
        rng: &mut G,
    ) -> Result<Vec<RingRecord>, BuildError> {
        let needed = self.params.ring_size.saturating_sub(1);
        let own: HashSet<Commitment> = chosen.iter().map(|u| u.commitment).collect();
        // Fensterreihenfolge, dedupliziert: deterministisch bei gleichem RNG-Seed
        let mut seen = HashSet::new();
        let pool: Vec<Commitment> = snapshot
            .window()
            .map(|e| e.commitment)
            .filter(|c| !own.contains(c) && seen.insert(*c))
            .collect();
        let mut used: HashSet<Commitment> = HashSet::new();
        let mut records = Vec::with_capacity(chosen.len());
        for u in chosen {
            let candidates: Vec<Commitment> =
                pool.iter().copied().filter(|c| !used.contains(c)).collect();
            if candidates.len() < needed {
                return Err(BuildError::InsufficientDecoys { needed, available: candidates.len() });
            }
            let mut ring: Vec<Commitment> = candidates.choose_multiple(rng, needed).copied().collect();
            used.extend(ring.iter().copied());
            ring.push(u.commitment);
            ring.sort();
            let index = ring
                .iter()
                .position(|c| *c == u.commitment)
                .ok_or(RingError::WitnessMismatch)?;
            let members: Vec<Hash32> = ring.iter().map(|c| c.0).collect();
            let signer = RingSigner {
                index,
                opening: u.opening.0,
                height: u.height,
                prev_hash: u.prev_hash.0,
            };
            let sig = self.ring.sign(&members, &signer, context)?;
            records.push(RingRecord { ring, signature: sig.signature, tag: UniquenessTag(sig.tag) });
        }
        Ok(records)
    }

    fn build_zk(
        &self,
        chosen: &[Usable],
        snapshot: &LedgerSnapshot,
        claim: u32,
        context: Hash32,
    ) -> Result<ZkReputationProof, BuildError> {
        let limits = self.params.prover_limits();
        limits.check(chosen.len())?;
        let root = snapshot.window_root();
        let statement = ZkStatement { root, claimed: claim, context };
        let witnesses: Vec<MembershipWitness> = chosen
            .iter()
            .map(|u| MembershipWitness { opening: u.opening.0, height: u.height, prev_hash: u.prev_hash.0 })
            .collect();
        let proof = self.zk.prove(&statement, &witnesses, &snapshot.window_commitments(), &limits)?;
        Ok(ZkReputationProof { claimed_reputation: claim, proof, root })
    }
}

/// Eigene Openings, deren Commitment im Fenster steht (nach Höhe sortiert, ohne Duplikate).
fn usable_openings(owned: &[OwnedOpening], snapshot: &LedgerSnapshot) -> Vec<Usable> {
    let by_height: BTreeMap<u64, Opening> = owned.iter().map(|o| (o.height, o.opening)).collect();
    let mut seen = HashSet::new();
    by_height
        .into_iter()
        .filter_map(|(height, opening)| {
            let entry = snapshot.entry_at(height)?;
            let commitment = Commitment::derive(&opening, height, &entry.prev_hash);
            (commitment == entry.commitment && seen.insert(commitment)).then_some(Usable {
                height,
                opening,
                prev_hash: entry.prev_hash,
                commitment,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::SecretDeriver;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rc_crypto::testkit::{TranscriptRing, TranscriptZk};
    use rc_ledger::CommitmentLedger;
    use rc_types::BlockHeader;

    fn params(window: usize, ring: usize) -> ConsensusParams {
        ConsensusParams { window_size: window, ring_size: ring, ..ConsensusParams::recommended() }
    }

    /// Kette, bei der `mine(h)` entscheidet, ob Höhe h dem Miner gehört.
    fn chain(p: &ConsensusParams, len: u64, miner: &SecretDeriver, mine: impl Fn(u64) -> bool) -> CommitmentLedger {
        let other = SecretDeriver::new([0xAA; 32]);
        let mut l = CommitmentLedger::genesis(p.ledger_params().unwrap());
        for _ in 0..len {
            let height = l.next_height();
            let prev_hash = l.tip_id();
            let d = if mine(height) { miner } else { &other };
            let h = BlockHeader {
                height,
                prev_hash,
                commitment: d.commitment_for(height, &prev_hash),
                difficulty: 1,
                proof: None,
            };
            l.append(&h).unwrap();
        }
        l
    }

    #[test]
    fn skips_foreign_evicted_and_duplicate_openings() {
        let p = params(4, 3);
        let miner = SecretDeriver::new([1u8; 32]);
        let l = chain(&p, 8, &miner, |h| h % 2 == 0);
        let snap = l.snapshot();
        // 0/2 evicted, 5 fremd, 6 doppelt
        let owned: Vec<OwnedOpening> = [0, 2, 4, 5, 6, 6].iter().map(|h| miner.owned(*h)).collect();
        let usable = usable_openings(&owned, &snap);
        let heights: Vec<u64> = usable.iter().map(|u| u.height).collect();
        assert_eq!(heights, vec![4, 6]);
    }

    #[test]
    fn insufficient_openings() {
        let p = params(4, 3);
        let miner = SecretDeriver::new([1u8; 32]);
        let l = chain(&p, 4, &miner, |h| h == 1);
        let (ring, zk) = (TranscriptRing::new(), TranscriptZk::new(b"vk"));
        let b = ProofBuilder::new(&p, &ring, &zk);
        let req = ProofRequest { variant: ProofVariant::Transparent, claim: 2 };
        let err = b.build(&[miner.owned(1)], &l.snapshot(), req, &mut StdRng::seed_from_u64(1));
        assert_eq!(err, Err(BuildError::InsufficientOpenings { available: 1, requested: 2 }));
    }

    #[test]
    fn ring_decoys_are_disjoint_and_sorted() {
        let p = params(16, 4);
        let miner = SecretDeriver::new([1u8; 32]);
        let l = chain(&p, 16, &miner, |h| h < 3);
        let owned: Vec<OwnedOpening> = (0..3).map(|h| miner.owned(h)).collect();
        let (ring, zk) = (TranscriptRing::new(), TranscriptZk::new(b"vk"));
        let b = ProofBuilder::new(&p, &ring, &zk);
        let req = ProofRequest { variant: ProofVariant::RingSignature, claim: 3 };
        let proof = b.build(&owned, &l.snapshot(), req, &mut StdRng::seed_from_u64(7)).unwrap();
        let ReputationProof::RingSignature(rp) = proof else { panic!("wrong variant") };
        assert_eq!(rp.records.len(), 3);
        let own: HashSet<Commitment> =
            (0..3).map(|h| l.view().entry_at(h).unwrap().commitment).collect();
        let mut decoys = HashSet::new();
        for rec in &rp.records {
            assert_eq!(rec.ring.len(), 4);
            assert!(rec.ring.windows(2).all(|w| w[0] < w[1]));
            let mine: Vec<&Commitment> = rec.ring.iter().filter(|c| own.contains(c)).collect();
            assert_eq!(mine.len(), 1);
            for c in rec.ring.iter().filter(|c| !own.contains(c)) {
                assert!(decoys.insert(*c), "decoy reused across rings");
            }
        }
    }

    #[test]
    fn ring_fails_without_enough_decoys() {
        let p = params(6, 4);
        let miner = SecretDeriver::new([1u8; 32]);
        let l = chain(&p, 6, &miner, |h| h < 2);
        let owned: Vec<OwnedOpening> = (0..2).map(|h| miner.owned(h)).collect();
        let (ring, zk) = (TranscriptRing::new(), TranscriptZk::new(b"vk"));
        let b = ProofBuilder::new(&p, &ring, &zk);
        let req = ProofRequest { variant: ProofVariant::RingSignature, claim: 2 };
        // 4 fremde Commitments: erster Ring nimmt 3, zweiter findet nur 1
        let err = b.build(&owned, &l.snapshot(), req, &mut StdRng::seed_from_u64(3));
        assert_eq!(err, Err(BuildError::InsufficientDecoys { needed: 3, available: 1 }));
    }

    #[test]
    fn zk_respects_constraint_budget() {
        let mut p = params(8, 3);
        p.zk_constraints_per_member = 10;
        p.zk_constraint_budget = 25;
        let miner = SecretDeriver::new([1u8; 32]);
        let l = chain(&p, 8, &miner, |_| true);
        let owned: Vec<OwnedOpening> = (0..8).map(|h| miner.owned(h)).collect();
        let (ring, zk) = (TranscriptRing::new(), TranscriptZk::new(b"vk"));
        let b = ProofBuilder::new(&p, &ring, &zk);
        let mut rng = StdRng::seed_from_u64(0);
        let ok = ProofRequest { variant: ProofVariant::ZeroKnowledge, claim: 2 };
        let proof = b.build(&owned, &l.snapshot(), ok, &mut rng).unwrap();
        assert_eq!(proof.claimed_reputation(), 2);
        let too_big = ProofRequest { variant: ProofVariant::ZeroKnowledge, claim: 3 };
        assert_eq!(
            b.build(&owned, &l.snapshot(), too_big, &mut rng),
            Err(BuildError::ConstraintBudgetExceeded { required: 30, budget: 25 })
        );
    }
}
