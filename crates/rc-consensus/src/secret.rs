// SPDX-License-Identifier: AGPL-3.0-only

use crate::consts::SECRET_KDF_CONTEXT;
use rc_crypto::kdf;
use rc_types::{BlockId, Commitment, Opening};

/// secret(seed, h) = KDF(seed, label = h_le)
pub fn derive_secret(master_seed: &[u8; 32], height: u64) -> Opening {
    Opening(kdf(SECRET_KDF_CONTEXT, master_seed, &height.to_le_bytes()))
}

/// Opening, das der Miner für eine Höhe hält.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnedOpening {
    pub height: u64,
    pub opening: Opening,
}

/// Miner-seitige Ableitung; wird von Peers nie geprüft.
#[derive(Clone)]
pub struct SecretDeriver {
    seed: [u8; 32],
}

impl core::fmt::Debug for SecretDeriver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretDeriver(..)")
    }
}

impl SecretDeriver {
    pub fn new(master_seed: [u8; 32]) -> Self {
        Self { seed: master_seed }
    }

    pub fn secret(&self, height: u64) -> Opening {
        derive_secret(&self.seed, height)
    }

    pub fn owned(&self, height: u64) -> OwnedOpening {
        OwnedOpening { height, opening: self.secret(height) }
    }

    /// Commitment für einen neuen Header auf `prev_hash`
    pub fn commitment_for(&self, height: u64, prev_hash: &BlockId) -> Commitment {
        Commitment::derive(&self.secret(height), height, prev_hash)
    }
}
