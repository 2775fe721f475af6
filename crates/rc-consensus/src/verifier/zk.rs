// SPDX-License-Identifier: AGPL-3.0-only

use super::VerifyError;
use rc_crypto::{Hash32, StepBudget, ZkError, ZkProofSystem, ZkStatement, ZkVerifyingKey};
use rc_ledger::LedgerSnapshot;
use rc_types::ZkReputationProof;

/// Ein Primitive-Aufruf unabhängig von k; Root wird vorher verglichen.
pub(super) fn verify<Z: ZkProofSystem + ?Sized>(
    zk: &Z,
    vk: &ZkVerifyingKey,
    proof: &ZkReputationProof,
    snapshot: &LedgerSnapshot,
    context: &Hash32,
    budget: &StepBudget,
) -> Result<u32, VerifyError> {
    let root = snapshot.window_root();
    if proof.root != root {
        return Err(VerifyError::WindowRootMismatch);
    }
    let statement = ZkStatement { root, claimed: proof.claimed_reputation, context: *context };
    match zk.verify(vk, &statement, &proof.proof, budget) {
        Ok(true) => Ok(proof.claimed_reputation),
        Ok(false) => Err(VerifyError::ZkProofInvalid),
        Err(ZkError::Budget(_)) => Err(VerifyError::Timeout),
        Err(e) => Err(VerifyError::Backend(e.to_string())),
    }
}
