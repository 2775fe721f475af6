// SPDX-License-Identifier: AGPL-3.0-only

use super::{check_cancel, check_count, VerifyError};
use rc_crypto::{CancelFlag, Hash32, RingScheme};
use rc_ledger::LedgerSnapshot;
use rc_types::RingProof;
use std::collections::HashSet;

/// Pro Record: Form, Fenster-Mitgliedschaft, Tag-Eindeutigkeit, dann Signatur.
/// Der Claim wird erst nach allen Records mit ihrer Anzahl verglichen.
pub(super) fn verify<S: RingScheme + ?Sized>(
    scheme: &S,
    proof: &RingProof,
    snapshot: &LedgerSnapshot,
    min_ring_size: usize,
    context: &Hash32,
    cancel: &CancelFlag,
) -> Result<u32, VerifyError> {
    let mut tags = HashSet::with_capacity(proof.records.len().min(snapshot.window_size()));
    for (record, rec) in proof.records.iter().enumerate() {
        check_cancel(cancel)?;
        if rec.ring.len() < min_ring_size {
            return Err(VerifyError::MalformedRing { record, reason: "ring below minimum size" });
        }
        let mut members = HashSet::with_capacity(rec.ring.len());
        if !rec.ring.iter().all(|c| members.insert(*c)) {
            return Err(VerifyError::MalformedRing { record, reason: "repeated ring member" });
        }
        if let Some(missing) = rec.ring.iter().find(|c| !snapshot.contains(c)) {
            return Err(VerifyError::RingMemberNotInWindow(*missing));
        }
        if !tags.insert(rec.tag) {
            return Err(VerifyError::DuplicateUniquenessTag(rec.tag));
        }
        let ring: Vec<Hash32> = rec.ring.iter().map(|c| c.0).collect();
        if !scheme.verify(&ring, context, &rec.signature, &rec.tag.0) {
            return Err(VerifyError::RingSignatureInvalid { record });
        }
    }
    check_count(proof.claimed_reputation, proof.records.len())?;
    Ok(proof.claimed_reputation)
}
