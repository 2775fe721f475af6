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

use rc_codec::{encode_to_vec, CodecError, Decodable, Encodable};
use rc_crypto::{commitment_digest, digest_with_domain, Hash32};
use std::io::{Read, Write};

pub mod proof;
pub use proof::{
    ProofVariant, ReputationProof, RevealedPair, RingProof, RingRecord, TransparentProof,
    UniquenessTag, ZkReputationProof,
};

// Stateless Limits (v1)
pub const MAX_PROOF_ITEMS: usize = 1 << 16;
pub const MAX_RING_SIZE: usize = 1024;
pub const MAX_RING_SIGNATURE_LEN: usize = 64 * 1024;

const HEADER_ID_DOMAIN: &[u8] = b"rc:header:v1\x01";
const PROOF_CTX_DOMAIN: &[u8] = b"rc:proof:ctx:v1\x01";

fn short_hex(h: &Hash32) -> String {
    hex::encode(h.get(..6).unwrap_or(&[]))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockId(pub Hash32);

impl core::fmt::Display for BlockId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", short_hex(&self.0))
    }
}

impl Encodable for BlockId {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.0.encode(w)
    }
    fn encoded_len(&self) -> usize {
        32
    }
}
impl Decodable for BlockId {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        Ok(Self(<[u8; 32]>::decode(r)?))
    }
}

/// Geheimnis hinter einem Commitment. Debug gibt den Inhalt nicht aus.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opening(pub [u8; 32]);

impl core::fmt::Debug for Opening {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Opening(..)")
    }
}

impl Encodable for Opening {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.0.encode(w)
    }
    fn encoded_len(&self) -> usize {
        32
    }
}
impl Decodable for Opening {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        Ok(Self(<[u8; 32]>::decode(r)?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Commitment(pub Hash32);

impl Commitment {
    /// Commitment = H(opening || height || prev_hash), domain-separiert
    pub fn derive(opening: &Opening, height: u64, prev_hash: &BlockId) -> Self {
        Self(commitment_digest(&opening.0, height, &prev_hash.0))
    }

    pub fn opens_with(&self, opening: &Opening, height: u64, prev_hash: &BlockId) -> bool {
        Self::derive(opening, height, prev_hash) == *self
    }
}

impl core::fmt::Display for Commitment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", short_hex(&self.0))
    }
}

impl Encodable for Commitment {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.0.encode(w)
    }
    fn encoded_len(&self) -> usize {
        32
    }
}
impl Decodable for Commitment {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        Ok(Self(<[u8; 32]>::decode(r)?))
    }
}

/// Verifizierte Reputation eines Blocks (0 ≤ k ≤ N)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ReputationScore(pub u32);

impl ReputationScore {
    pub const ZERO: Self = Self(0);

    pub fn get(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub height: u64,
    pub prev_hash: BlockId,
    pub commitment: Commitment,
    /// PoW-Arbeit dieses Blocks (Gewicht in der Fork-Choice)
    pub difficulty: u64,
    pub proof: Option<ReputationProof>,
}

impl BlockHeader {
    /// Hash der kanonischen Kodierung; nicht kodierbare Header haben keine Id.
    pub fn id(&self) -> Result<BlockId, CodecError> {
        let buf = encode_to_vec(self)?;
        Ok(BlockId(digest_with_domain(HEADER_ID_DOMAIN, &[&buf])))
    }

    pub fn claimed_reputation(&self) -> u32 {
        self.proof.as_ref().map(|p| p.claimed_reputation()).unwrap_or(0)
    }
}

impl Encodable for BlockHeader {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.height.encode(w)?;
        self.prev_hash.encode(w)?;
        self.commitment.encode(w)?;
        self.difficulty.encode(w)?;
        match &self.proof {
            Some(p) => p.encode(w)?,
            None => proof::TAG_NONE.encode(w)?,
        }
        Ok(())
    }
    fn encoded_len(&self) -> usize {
        let mut n = 0usize;
        n += self.height.encoded_len();
        n += self.prev_hash.encoded_len();
        n += self.commitment.encoded_len();
        n += self.difficulty.encoded_len();
        n += match &self.proof {
            Some(p) => p.encoded_len(),
            None => 1,
        };
        n
    }
}
impl Decodable for BlockHeader {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let height = u64::decode(r)?;
        let prev_hash = BlockId::decode(r)?;
        let commitment = Commitment::decode(r)?;
        let difficulty = u64::decode(r)?;
        let proof = ReputationProof::decode_tagged(r)?;
        Ok(Self { height, prev_hash, commitment, difficulty, proof })
    }
}

/// Bindet Ring-/ZK-Aussagen an den beanspruchenden Header:
/// ctx = H(domain || claim_height_le || parent_id)
pub fn proof_context(claim_height: u64, parent: &BlockId) -> Hash32 {
    digest_with_domain(PROOF_CTX_DOMAIN, &[&claim_height.to_le_bytes(), &parent.0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rc_codec::{decode_exact, encode_to_vec};
    use rc_crypto::blake3_32;

    fn opening(i: u8) -> Opening {
        Opening(blake3_32(&[b'o', i]))
    }

    #[test]
    fn commitment_opens_only_with_its_inputs() {
        let prev = BlockId([3u8; 32]);
        let c = Commitment::derive(&opening(1), 42, &prev);
        assert!(c.opens_with(&opening(1), 42, &prev));
        assert!(!c.opens_with(&opening(2), 42, &prev));
        assert!(!c.opens_with(&opening(1), 43, &prev));
        assert!(!c.opens_with(&opening(1), 42, &BlockId([4u8; 32])));
    }

    #[test]
    fn opening_debug_is_redacted() {
        assert_eq!(format!("{:?}", opening(1)), "Opening(..)");
    }

    #[test]
    fn header_without_proof_layout() {
        let h = BlockHeader {
            height: 7,
            prev_hash: BlockId([1u8; 32]),
            commitment: Commitment([2u8; 32]),
            difficulty: 3,
            proof: None,
        };
        let buf = encode_to_vec(&h).unwrap();
        // height(8) + prev(32) + commitment(32) + difficulty(8) + tag(1)
        assert_eq!(buf.len(), 81);
        assert_eq!(buf.len(), h.encoded_len());
        assert_eq!(buf.last().copied(), Some(0));
        assert_eq!(decode_exact::<BlockHeader>(&buf).unwrap(), h);
        assert_eq!(h.claimed_reputation(), 0);
    }

    #[test]
    fn header_id_covers_proof() {
        let mut h = BlockHeader {
            height: 1,
            prev_hash: BlockId::default(),
            commitment: Commitment([9u8; 32]),
            difficulty: 1,
            proof: None,
        };
        let id0 = h.id().unwrap();
        h.proof = Some(ReputationProof::Transparent(TransparentProof {
            claimed_reputation: 0,
            pairs: vec![],
        }));
        assert_ne!(id0, h.id().unwrap());
    }

    #[test]
    fn proof_context_depends_on_height_and_parent() {
        let p = BlockId([5u8; 32]);
        assert_ne!(proof_context(10, &p), proof_context(11, &p));
        assert_ne!(proof_context(10, &p), proof_context(10, &BlockId([6u8; 32])));
    }
}
