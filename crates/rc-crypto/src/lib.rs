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

pub type Hash32 = [u8; 32];

pub mod budget;
pub use budget::{BudgetError, CancelFlag, StepBudget, StepMeter};
pub mod ring;
pub use ring::{RingError, RingScheme, RingSignature, RingSigner};
pub mod zk;
pub use zk::{
    MembershipWitness, ProverLimits, ZkError, ZkProofSystem, ZkStatement, ZkVerifyingKey,
    ZK_PROOF_LEN,
};
#[cfg(feature = "testkit")]
pub mod testkit;

const COMMIT_DOMAIN: &[u8] = b"rc:commit:v1\x01";
const TAG_DOMAIN: &[u8] = b"rc:ring:tag:v1\x01";
const MRKL_PAIR_DOMAIN: &[u8] = b"rc:mrkl:pair:v1\x01";

/// Compute BLAKE3-256 (32 bytes) digest
pub fn blake3_32(data: &[u8]) -> Hash32 {
    *blake3::hash(data).as_bytes()
}

/// Domain-separierter Hash über mehrere Teile: H(domain || p0 || p1 || ...)
pub fn digest_with_domain(domain: &[u8], parts: &[&[u8]]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    for p in parts {
        hasher.update(p);
    }
    *hasher.finalize().as_bytes()
}

/// KDF(seed, label) im BLAKE3 derive-key Modus; `context` muss global eindeutig sein.
pub fn kdf(context: &str, seed: &[u8; 32], label: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(seed);
    hasher.update(label);
    *hasher.finalize().as_bytes()
}

/// Commitment = H(domain || opening(32) || height_le(8) || prev_hash(32))
pub fn commitment_digest(opening: &[u8; 32], height: u64, prev_hash: &Hash32) -> Hash32 {
    digest_with_domain(COMMIT_DOMAIN, &[opening, &height.to_le_bytes(), prev_hash])
}

/// Eindeutigkeits-Tag eines Openings; gleiches Opening → gleiches Tag.
pub fn uniqueness_tag(opening: &[u8; 32]) -> Hash32 {
    digest_with_domain(TAG_DOMAIN, &[opening])
}

/// Merkle-Root über 32-Byte-Leaves (letztes Leaf wird bei ungerader Anzahl dupliziert).
/// Leerer Baum → 32 Byte Null.
pub fn merkle_root_hashes(leaves: &[Hash32]) -> Hash32 {
    match leaves {
        [] => return [0u8; 32],
        [single] => return *single,
        _ => {}
    }
    let mut level: Vec<Hash32> = leaves.to_vec();
    while level.len() > 1 {
        let mut next: Vec<Hash32> = Vec::with_capacity(level.len().div_ceil(2));
        let mut it = level.iter();
        while let Some(left) = it.next() {
            let right = it.next().unwrap_or(left);
            next.push(digest_with_domain(MRKL_PAIR_DOMAIN, &[left, right]));
        }
        level = next;
    }
    level.pop().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex::encode as hex_encode;
    use proptest::prelude::*;

    #[test]
    fn blake3_empty_vector() {
        assert_eq!(
            hex_encode(blake3_32(b"")),
            "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262"
        );
    }

    #[test]
    fn merkle_basic() {
        let a = blake3_32(b"a");
        let b = blake3_32(b"b");
        let c = blake3_32(b"c");
        assert_eq!(merkle_root_hashes(&[a, b]), merkle_root_hashes(&[a, b]));
        assert_ne!(merkle_root_hashes(&[a, b]), merkle_root_hashes(&[b, a]));
        assert_eq!(merkle_root_hashes(&[a]), a);
        assert_eq!(merkle_root_hashes(&[]), [0u8; 32]);
        // ungerade: c wird mit sich selbst gepaart
        assert_eq!(merkle_root_hashes(&[a, b, c]), merkle_root_hashes(&[a, b, c, c]));
    }

    #[test]
    fn kdf_separates_labels_and_contexts() {
        let seed = blake3_32(b"seed");
        let s1 = kdf("rc test ctx", &seed, &1u64.to_le_bytes());
        let s2 = kdf("rc test ctx", &seed, &2u64.to_le_bytes());
        let s1b = kdf("rc test ctx", &seed, &1u64.to_le_bytes());
        let other = kdf("rc other ctx", &seed, &1u64.to_le_bytes());
        assert_eq!(s1, s1b);
        assert_ne!(s1, s2);
        assert_ne!(s1, other);
    }

    #[test]
    fn tag_differs_from_commitment() {
        let o = blake3_32(b"opening");
        assert_ne!(uniqueness_tag(&o), commitment_digest(&o, 0, &[0u8; 32]));
        assert_eq!(uniqueness_tag(&o), uniqueness_tag(&o));
    }

    proptest! {
        #[test]
        fn prop_commitment_binds_every_input(
            opening in any::<[u8;32]>(),
            height in any::<u64>(),
            prev in any::<[u8;32]>(),
            flip in 0usize..72,
        ) {
            let c = commitment_digest(&opening, height, &prev);
            prop_assert_eq!(c, commitment_digest(&opening, height, &prev));
            let mut o2 = opening;
            let mut h2 = height;
            let mut p2 = prev;
            match flip {
                0..=31 => { if let Some(b) = o2.get_mut(flip) { *b ^= 0x01; } }
                32..=39 => { h2 ^= 1u64 << ((flip - 32) * 8); }
                _ => { if let Some(b) = p2.get_mut(flip - 40) { *b ^= 0x80; } }
            }
            prop_assert_ne!(c, commitment_digest(&o2, h2, &p2));
        }
    }
}
