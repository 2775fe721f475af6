// SPDX-License-Identifier: AGPL-3.0-only

//! Deterministische Transcript-Backends für Ring- und ZK-Primitive.
//!
//! Diese Backends prüfen beim *Erzeugen* das Wissen des Signers/Provers,
//! beim *Verifizieren* aber nur ein öffentliches Transcript. Sie sind damit
//! fälschbar und ausschließlich für Tests, Benches und Simulationen gedacht.

use crate::budget::StepBudget;
use crate::ring::{RingError, RingScheme, RingSignature, RingSigner};
use crate::zk::{MembershipWitness, ProverLimits, ZkError, ZkProofSystem, ZkStatement, ZkVerifyingKey, ZK_PROOF_LEN};
use crate::{blake3_32, commitment_digest, digest_with_domain, merkle_root_hashes, uniqueness_tag, Hash32};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

const RING_TRANSCRIPT_DOMAIN: &[u8] = b"rc:testkit:ring:v1\x01";
const ZK_TRANSCRIPT_DOMAIN: &[u8] = b"rc:testkit:zk:v1\x01";

#[derive(Debug, Default)]
pub struct TranscriptRing {
    verify_calls: AtomicU64,
}

impl TranscriptRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify_calls(&self) -> u64 {
        self.verify_calls.load(Ordering::Relaxed)
    }

    fn transcript(ring: &[Hash32], msg: &Hash32, tag: &Hash32) -> Hash32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(RING_TRANSCRIPT_DOMAIN);
        hasher.update(msg);
        hasher.update(&(ring.len() as u64).to_le_bytes());
        for member in ring {
            hasher.update(member);
        }
        hasher.update(tag);
        *hasher.finalize().as_bytes()
    }
}

impl RingScheme for TranscriptRing {
    fn sign(
        &self,
        ring: &[Hash32],
        signer: &RingSigner,
        msg: &Hash32,
    ) -> Result<RingSignature, RingError> {
        if ring.is_empty() {
            return Err(RingError::EmptyRing);
        }
        let member = ring
            .get(signer.index)
            .ok_or(RingError::SignerOutOfRange { index: signer.index, ring_len: ring.len() })?;
        if commitment_digest(&signer.opening, signer.height, &signer.prev_hash) != *member {
            return Err(RingError::WitnessMismatch);
        }
        let tag = uniqueness_tag(&signer.opening);
        let signature = Self::transcript(ring, msg, &tag).to_vec();
        Ok(RingSignature { signature, tag })
    }

    fn verify(&self, ring: &[Hash32], msg: &Hash32, signature: &[u8], tag: &Hash32) -> bool {
        self.verify_calls.fetch_add(1, Ordering::Relaxed);
        if ring.is_empty() {
            return false;
        }
        signature == Self::transcript(ring, msg, tag).as_slice()
    }
}

#[derive(Debug)]
pub struct TranscriptZk {
    vk: ZkVerifyingKey,
    steps_per_verify: u64,
    verify_calls: AtomicU64,
}

impl TranscriptZk {
    pub fn new(setup_seed: &[u8]) -> Self {
        Self::with_verify_cost(setup_seed, 1_000)
    }

    /// `steps_per_verify` simuliert die (konstante) Kosten einer Verifikation.
    pub fn with_verify_cost(setup_seed: &[u8], steps_per_verify: u64) -> Self {
        let vk = ZkVerifyingKey(blake3_32(setup_seed).to_vec());
        Self { vk, steps_per_verify, verify_calls: AtomicU64::new(0) }
    }

    pub fn verifying_key(&self) -> ZkVerifyingKey {
        self.vk.clone()
    }

    pub fn verify_calls(&self) -> u64 {
        self.verify_calls.load(Ordering::Relaxed)
    }

    fn transcript(vk: &ZkVerifyingKey, st: &ZkStatement) -> [u8; ZK_PROOF_LEN] {
        let seed = digest_with_domain(
            ZK_TRANSCRIPT_DOMAIN,
            &[&vk.0, &st.root, &st.claimed.to_le_bytes(), &st.context],
        );
        let mut out = [0u8; ZK_PROOF_LEN];
        let mut hasher = blake3::Hasher::new();
        hasher.update(&seed);
        hasher.finalize_xof().fill(&mut out);
        out
    }
}

impl ZkProofSystem for TranscriptZk {
    fn prove(
        &self,
        statement: &ZkStatement,
        witnesses: &[MembershipWitness],
        window: &[Hash32],
        limits: &ProverLimits,
    ) -> Result<[u8; ZK_PROOF_LEN], ZkError> {
        limits.check(witnesses.len())?;
        if witnesses.len() != statement.claimed as usize {
            return Err(ZkError::InvalidWitness("witness count differs from claim"));
        }
        if merkle_root_hashes(window) != statement.root {
            return Err(ZkError::InvalidWitness("window does not match root"));
        }
        let members: HashSet<&Hash32> = window.iter().collect();
        let mut seen: HashSet<[u8; 32]> = HashSet::with_capacity(witnesses.len());
        for w in witnesses {
            if !seen.insert(w.opening) {
                return Err(ZkError::InvalidWitness("duplicate opening"));
            }
            let c = commitment_digest(&w.opening, w.height, &w.prev_hash);
            if !members.contains(&c) {
                return Err(ZkError::InvalidWitness("commitment not in window"));
            }
        }
        Ok(Self::transcript(&self.vk, statement))
    }

    fn verify(
        &self,
        vk: &ZkVerifyingKey,
        statement: &ZkStatement,
        proof: &[u8; ZK_PROOF_LEN],
        budget: &StepBudget,
    ) -> Result<bool, ZkError> {
        self.verify_calls.fetch_add(1, Ordering::Relaxed);
        let mut meter = budget.meter();
        meter.charge(self.steps_per_verify)?;
        if *vk != self.vk {
            return Ok(false);
        }
        Ok(Self::transcript(vk, statement) == *proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::{BudgetError, CancelFlag};

    fn opening(i: u8) -> [u8; 32] {
        blake3_32(&[b'o', i])
    }

    #[test]
    fn ring_sign_requires_matching_opening() {
        let prev = [7u8; 32];
        let c0 = commitment_digest(&opening(0), 5, &prev);
        let c1 = blake3_32(b"decoy");
        let ring = vec![c1, c0];
        let backend = TranscriptRing::new();
        let msg = blake3_32(b"msg");
        let ok = RingSigner { index: 1, opening: opening(0), height: 5, prev_hash: prev };
        let sig = backend.sign(&ring, &ok, &msg).unwrap();
        assert!(backend.verify(&ring, &msg, &sig.signature, &sig.tag));
        assert_eq!(sig.tag, uniqueness_tag(&opening(0)));

        let wrong = RingSigner { index: 0, ..ok.clone() };
        assert_eq!(backend.sign(&ring, &wrong, &msg), Err(RingError::WitnessMismatch));
        let out = RingSigner { index: 2, ..ok };
        assert!(matches!(backend.sign(&ring, &out, &msg), Err(RingError::SignerOutOfRange { .. })));
    }

    #[test]
    fn ring_verify_rejects_tampering() {
        let prev = [1u8; 32];
        let c0 = commitment_digest(&opening(3), 9, &prev);
        let ring = vec![c0, blake3_32(b"d1"), blake3_32(b"d2")];
        let backend = TranscriptRing::new();
        let msg = blake3_32(b"ctx");
        let signer = RingSigner { index: 0, opening: opening(3), height: 9, prev_hash: prev };
        let sig = backend.sign(&ring, &signer, &msg).unwrap();
        let mut bad = sig.signature.clone();
        bad[0] ^= 1;
        assert!(!backend.verify(&ring, &msg, &bad, &sig.tag));
        assert!(!backend.verify(&ring, &blake3_32(b"other"), &sig.signature, &sig.tag));
        let mut swapped = ring.clone();
        swapped.swap(1, 2);
        assert!(!backend.verify(&swapped, &msg, &sig.signature, &sig.tag));
        assert_eq!(backend.verify_calls(), 3);
    }

    #[test]
    fn zk_prove_verify_and_budget() {
        let prev = [2u8; 32];
        let window: Vec<Hash32> = (0..4u8).map(|i| commitment_digest(&opening(i), i as u64, &prev)).collect();
        let root = merkle_root_hashes(&window);
        let st = ZkStatement { root, claimed: 2, context: [9u8; 32] };
        let wits: Vec<MembershipWitness> = (0..2u8)
            .map(|i| MembershipWitness { opening: opening(i), height: i as u64, prev_hash: prev })
            .collect();
        let zk = TranscriptZk::with_verify_cost(b"setup", 50);
        let limits = ProverLimits { constraint_budget: 1 << 20, constraints_per_member: 1 };
        let proof = zk.prove(&st, &wits, &window, &limits).unwrap();
        let vk = zk.verifying_key();
        assert_eq!(zk.verify(&vk, &st, &proof, &StepBudget::new(100, CancelFlag::new())), Ok(true));
        let other = ZkStatement { claimed: 3, ..st };
        assert_eq!(zk.verify(&vk, &other, &proof, &StepBudget::new(100, CancelFlag::new())), Ok(false));
        assert_eq!(
            zk.verify(&vk, &st, &proof, &StepBudget::new(10, CancelFlag::new())),
            Err(ZkError::Budget(BudgetError::Exhausted { limit: 10 }))
        );
    }

    #[test]
    fn zk_prove_rejects_foreign_opening() {
        let prev = [2u8; 32];
        let window = vec![commitment_digest(&opening(0), 0, &prev)];
        let st = ZkStatement { root: merkle_root_hashes(&window), claimed: 1, context: [0u8; 32] };
        let wits = vec![MembershipWitness { opening: opening(1), height: 0, prev_hash: prev }];
        let zk = TranscriptZk::new(b"setup");
        let limits = ProverLimits { constraint_budget: 100, constraints_per_member: 1 };
        assert!(matches!(zk.prove(&st, &wits, &window, &limits), Err(ZkError::InvalidWitness(_))));
    }
}
