// SPDX-License-Identifier: AGPL-3.0-only

use super::{check_cancel, check_count, VerifyError};
use rc_crypto::CancelFlag;
use rc_ledger::LedgerSnapshot;
use rc_types::TransparentProof;
use std::collections::HashSet;

/// O(k): jedes Paar wird nachgeschlagen und neu gehasht; der Claim wird erst
/// danach mit der Anzahl verglichen. Spätestens Paar N+1 scheitert, da das
/// Fenster nur N verschiedene Commitments hält.
pub(super) fn verify(
    proof: &TransparentProof,
    snapshot: &LedgerSnapshot,
    cancel: &CancelFlag,
) -> Result<u32, VerifyError> {
    let mut seen = HashSet::with_capacity(proof.pairs.len().min(snapshot.window_size()));
    for pair in &proof.pairs {
        check_cancel(cancel)?;
        let (height, prev_hash) = snapshot
            .lookup(&pair.commitment)
            .map_err(|_| VerifyError::CommitmentNotInWindow(pair.commitment))?;
        if !pair.commitment.opens_with(&pair.opening, height, &prev_hash) {
            return Err(VerifyError::OpeningMismatch(pair.commitment));
        }
        if !seen.insert(pair.commitment) {
            return Err(VerifyError::DuplicateCommitment(pair.commitment));
        }
    }
    check_count(proof.claimed_reputation, proof.pairs.len())?;
    Ok(proof.claimed_reputation)
}
