// SPDX-License-Identifier: AGPL-3.0-only

// Empfohlene Default-Konstanten (v1); netzabhängige Werte kommen aus der Config.

pub const DEFAULT_WINDOW_SIZE: usize = 1000; // N

// Reputationsgewicht α = 4/10 (ganzzahlig)
pub const REP_ALPHA_NUM: u32 = 4;
pub const REP_ALPHA_DEN: u32 = 10;

pub const DEFAULT_RING_SIZE: usize = 11; // r = 1 Signer + 10 Decoys
pub const MIN_RING_SIZE: usize = 2;

pub const DEFAULT_MAX_FORK_DEPTH: usize = 1000;

// ZK-Verifikation / Prover
pub const ZK_STEP_BUDGET: u64 = 1_000_000;
pub const ZK_CONSTRAINTS_PER_MEMBER: u64 = 4_096;
pub const ZK_CONSTRAINT_BUDGET: u64 = 8_388_608; // 2^23

pub const VERIFY_TIMEOUT_MS: u64 = 30_000;

/// KDF-Kontext der Miner-Secrets; darf sich nie ändern.
pub const SECRET_KDF_CONTEXT: &str = "rc:secret:v1";
