// SPDX-License-Identifier: AGPL-3.0-only

//! Reputationsbeweise als Summentyp: jede Variante trägt nur ihre eigenen Felder.

use crate::{Commitment, Opening, MAX_PROOF_ITEMS, MAX_RING_SIGNATURE_LEN, MAX_RING_SIZE};
use rc_codec::{bytes_len, read_bytes, read_len, varu64_len, write_bytes, write_varu64, CodecError, Decodable, Encodable};
use rc_crypto::{Hash32, ZK_PROOF_LEN};
use std::io::{Read, Write};

pub(crate) const TAG_NONE: u8 = 0;
const TAG_TRANSPARENT: u8 = 1;
const TAG_RING: u8 = 2;
const TAG_ZK: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProofVariant {
    Transparent,
    RingSignature,
    ZeroKnowledge,
}

impl ProofVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transparent => "transparent",
            Self::RingSignature => "ring",
            Self::ZeroKnowledge => "zk",
        }
    }
}

impl core::fmt::Display for ProofVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniquenessTag(pub Hash32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RevealedPair {
    pub commitment: Commitment,
    pub opening: Opening,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransparentProof {
    pub claimed_reputation: u32,
    pub pairs: Vec<RevealedPair>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingRecord {
    pub ring: Vec<Commitment>,
    pub signature: Vec<u8>,
    pub tag: UniquenessTag,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingProof {
    pub claimed_reputation: u32,
    pub records: Vec<RingRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZkReputationProof {
    pub claimed_reputation: u32,
    pub proof: [u8; ZK_PROOF_LEN],
    /// Öffentliche Eingabe: Commitment-Root des Fensters
    pub root: Hash32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReputationProof {
    Transparent(TransparentProof),
    RingSignature(RingProof),
    ZeroKnowledge(ZkReputationProof),
}

impl ReputationProof {
    pub fn claimed_reputation(&self) -> u32 {
        match self {
            Self::Transparent(p) => p.claimed_reputation,
            Self::RingSignature(p) => p.claimed_reputation,
            Self::ZeroKnowledge(p) => p.claimed_reputation,
        }
    }

    pub fn variant(&self) -> ProofVariant {
        match self {
            Self::Transparent(_) => ProofVariant::Transparent,
            Self::RingSignature(_) => ProofVariant::RingSignature,
            Self::ZeroKnowledge(_) => ProofVariant::ZeroKnowledge,
        }
    }

    /// Liest Tag + Payload; Tag 0 bedeutet "kein Proof".
    pub fn decode_tagged<R: Read>(r: &mut R) -> Result<Option<Self>, CodecError> {
        match u8::decode(r)? {
            TAG_NONE => Ok(None),
            TAG_TRANSPARENT => Ok(Some(Self::Transparent(TransparentProof::decode(r)?))),
            TAG_RING => Ok(Some(Self::RingSignature(RingProof::decode(r)?))),
            TAG_ZK => Ok(Some(Self::ZeroKnowledge(ZkReputationProof::decode(r)?))),
            t => Err(CodecError::InvalidTag(t)),
        }
    }
}

impl Encodable for ReputationProof {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        match self {
            Self::Transparent(p) => {
                TAG_TRANSPARENT.encode(w)?;
                p.encode(w)
            }
            Self::RingSignature(p) => {
                TAG_RING.encode(w)?;
                p.encode(w)
            }
            Self::ZeroKnowledge(p) => {
                TAG_ZK.encode(w)?;
                p.encode(w)
            }
        }
    }
    fn encoded_len(&self) -> usize {
        1 + match self {
            Self::Transparent(p) => p.encoded_len(),
            Self::RingSignature(p) => p.encoded_len(),
            Self::ZeroKnowledge(p) => p.encoded_len(),
        }
    }
}
impl Decodable for ReputationProof {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        Self::decode_tagged(r)?.ok_or(CodecError::InvalidTag(TAG_NONE))
    }
}

impl Encodable for RevealedPair {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.commitment.encode(w)?;
        self.opening.encode(w)
    }
    fn encoded_len(&self) -> usize {
        64
    }
}
impl Decodable for RevealedPair {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        Ok(Self { commitment: Commitment::decode(r)?, opening: Opening::decode(r)? })
    }
}

// Encode lehnt ab, was Decode ablehnen würde; sonst fehlt der Roundtrip.
fn check_len(n: usize, max: usize) -> Result<(), CodecError> {
    if n > max {
        return Err(CodecError::InvalidLength(n));
    }
    Ok(())
}

impl Encodable for TransparentProof {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        check_len(self.pairs.len(), MAX_PROOF_ITEMS)?;
        self.claimed_reputation.encode(w)?;
        self.pairs.encode(w)
    }
    fn encoded_len(&self) -> usize {
        4 + self.pairs.encoded_len()
    }
}
impl Decodable for TransparentProof {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let claimed_reputation = u32::decode(r)?;
        let n = read_len(r, MAX_PROOF_ITEMS)?;
        let mut pairs = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            pairs.push(RevealedPair::decode(r)?);
        }
        Ok(Self { claimed_reputation, pairs })
    }
}

impl Encodable for RingRecord {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        check_len(self.ring.len(), MAX_RING_SIZE)?;
        check_len(self.signature.len(), MAX_RING_SIGNATURE_LEN)?;
        let ring_size =
            u16::try_from(self.ring.len()).map_err(|_| CodecError::InvalidLength(self.ring.len()))?;
        ring_size.encode(w)?;
        for m in &self.ring {
            m.encode(w)?;
        }
        write_bytes(w, &self.signature)?;
        self.tag.0.encode(w)
    }
    fn encoded_len(&self) -> usize {
        2 + 32 * self.ring.len() + bytes_len(&self.signature) + 32
    }
}
impl Decodable for RingRecord {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let ring_size = u16::decode(r)? as usize;
        if ring_size > MAX_RING_SIZE {
            return Err(CodecError::InvalidLength(ring_size));
        }
        let mut ring = Vec::with_capacity(ring_size);
        for _ in 0..ring_size {
            ring.push(Commitment::decode(r)?);
        }
        let signature = read_bytes(r, MAX_RING_SIGNATURE_LEN)?;
        let tag = UniquenessTag(<[u8; 32]>::decode(r)?);
        Ok(Self { ring, signature, tag })
    }
}

impl Encodable for RingProof {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        check_len(self.records.len(), MAX_PROOF_ITEMS)?;
        self.claimed_reputation.encode(w)?;
        write_varu64(w, self.records.len() as u64)?;
        for rec in &self.records {
            rec.encode(w)?;
        }
        Ok(())
    }
    fn encoded_len(&self) -> usize {
        4 + varu64_len(self.records.len() as u64)
            + self.records.iter().map(Encodable::encoded_len).sum::<usize>()
    }
}
impl Decodable for RingProof {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let claimed_reputation = u32::decode(r)?;
        let n = read_len(r, MAX_PROOF_ITEMS)?;
        let mut records = Vec::with_capacity(n.min(256));
        for _ in 0..n {
            records.push(RingRecord::decode(r)?);
        }
        Ok(Self { claimed_reputation, records })
    }
}

impl Encodable for ZkReputationProof {
    fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        self.claimed_reputation.encode(w)?;
        w.write_all(&self.proof).map_err(CodecError::from)?;
        self.root.encode(w)
    }
    fn encoded_len(&self) -> usize {
        4 + ZK_PROOF_LEN + 32
    }
}
impl Decodable for ZkReputationProof {
    fn decode<R: Read>(r: &mut R) -> Result<Self, CodecError> {
        let claimed_reputation = u32::decode(r)?;
        let mut proof = [0u8; ZK_PROOF_LEN];
        r.read_exact(&mut proof)?;
        let root = <[u8; 32]>::decode(r)?;
        Ok(Self { claimed_reputation, proof, root })
    }
}
