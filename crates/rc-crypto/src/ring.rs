// SPDX-License-Identifier: AGPL-3.0-only

//! Ring-Signatur-Schnittstelle (Black Box).
//!
//! Ringmitglieder sind Commitment-Digests aus dem Fenster. Ein Backend beweist
//! Kenntnis des Openings genau eines Mitglieds, ohne zu verraten welches, und
//! liefert ein Tag, das pro Opening deterministisch ist.

use crate::Hash32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// Signer-Index liegt außerhalb des Rings
    SignerOutOfRange { index: usize, ring_len: usize },
    /// Opening passt nicht zum Commitment an der Signer-Position
    WitnessMismatch,
    EmptyRing,
    Backend(String),
}

impl core::fmt::Display for RingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SignerOutOfRange { index, ring_len } => {
                write!(f, "signer index {index} outside ring of {ring_len}")
            }
            Self::WitnessMismatch => write!(f, "opening does not open the signer's ring member"),
            Self::EmptyRing => write!(f, "empty ring"),
            Self::Backend(e) => write!(f, "ring backend: {e}"),
        }
    }
}
impl std::error::Error for RingError {}

/// Geheimes Wissen des Signers: Opening plus die Header-Bindung seines Commitments.
#[derive(Clone, Debug)]
pub struct RingSigner {
    pub index: usize,
    pub opening: [u8; 32],
    pub height: u64,
    pub prev_hash: Hash32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingSignature {
    pub signature: Vec<u8>,
    pub tag: Hash32,
}

pub trait RingScheme: Send + Sync {
    fn sign(
        &self,
        ring: &[Hash32],
        signer: &RingSigner,
        msg: &Hash32,
    ) -> Result<RingSignature, RingError>;

    fn verify(&self, ring: &[Hash32], msg: &Hash32, signature: &[u8], tag: &Hash32) -> bool;
}
