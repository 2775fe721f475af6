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

//! Rollierendes Commitment-Fenster pro Chain-Tip.
//!
//! Jede Instanz hat genau einen Schreiber. Einträge liegen in Chunks fester
//! Länge: volle Chunks sind versiegelt und werden zwischen Snapshots und
//! Forks nur per `Arc` geteilt, geschrieben wird allein in den Tail-Chunk
//! (`Arc::make_mut`). Snapshot plus Append kostet damit höchstens eine Kopie
//! von `CHUNK_LEN` Einträgen; Geschwister sehen fremde Appends nie.

use rc_codec::CodecError;
use rc_crypto::{merkle_root_hashes, Hash32};
use rc_types::{BlockHeader, BlockId, Commitment};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Einträge pro Chunk
const CHUNK_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    InvalidParams,
    /// Höhe ist nicht genau tip+1
    WindowCorrupt { expected: u64, got: u64 },
    ParentMismatch { height: u64, expected: BlockId, got: BlockId },
    NotFound(Commitment),
    UnknownHeight(u64),
    ForkTooDeep { height: u64, oldest_retained: u64 },
    /// Header ohne kanonische Kodierung (und damit ohne Id)
    Malformed(CodecError),
}

impl core::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidParams => write!(f, "invalid ledger params"),
            Self::WindowCorrupt { expected, got } => {
                write!(f, "window corrupt: expected height {expected}, got {got}")
            }
            Self::ParentMismatch { height, expected, got } => {
                write!(f, "header {height} extends {got}, tip is {expected}")
            }
            Self::NotFound(c) => write!(f, "commitment {c} not in window"),
            Self::UnknownHeight(h) => write!(f, "unknown height {h}"),
            Self::ForkTooDeep { height, oldest_retained } => {
                write!(f, "fork at {height} needs history below oldest retained height {oldest_retained}")
            }
            Self::Malformed(e) => write!(f, "header not encodable: {e}"),
        }
    }
}
impl std::error::Error for LedgerError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerParams {
    /// N: Anzahl beanspruchbarer Commitments
    pub window_size: usize,
    /// Zusätzlich gehaltene Einträge unterhalb des Fensters (für fork_at)
    pub max_fork_depth: usize,
}

impl LedgerParams {
    pub fn new(window_size: usize, max_fork_depth: usize) -> Result<Self, LedgerError> {
        if window_size == 0 {
            return Err(LedgerError::InvalidParams);
        }
        Ok(Self { window_size, max_fork_depth })
    }

    fn retained(&self) -> u64 {
        self.window_size.saturating_add(self.max_fork_depth) as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowEntry {
    pub height: u64,
    pub prev_hash: BlockId,
    pub commitment: Commitment,
    pub id: BlockId,
}

#[derive(Clone, Debug, Default)]
struct Chunk {
    // aufsteigend nach Höhe, lückenlos
    entries: Vec<WindowEntry>,
    // Commitment → Höhen (aufsteigend) innerhalb des Chunks
    index: HashMap<Commitment, Vec<u64>>,
}

impl Chunk {
    fn push(&mut self, e: WindowEntry) {
        self.index.entry(e.commitment).or_default().push(e.height);
        self.entries.push(e);
    }

    fn is_full(&self) -> bool {
        self.entries.len() >= CHUNK_LEN
    }

    fn truncated(&self, last: u64) -> Self {
        let mut c = Self::default();
        for e in self.entries.iter().take_while(|e| e.height <= last) {
            c.push(*e);
        }
        c
    }
}

/// Chunk k hält die Höhen `origin + k*CHUNK_LEN ..`; Chunks vor `front_chunk`
/// sind verworfen.
#[derive(Clone, Debug)]
struct ChunkStore {
    origin: u64,
    front_chunk: u64,
    sealed: Arc<VecDeque<Arc<Chunk>>>,
    tail: Arc<Chunk>,
}

impl ChunkStore {
    fn new(origin: u64) -> Self {
        Self { origin, front_chunk: 0, sealed: Arc::default(), tail: Arc::default() }
    }

    fn chunk_no(&self, height: u64) -> Option<u64> {
        height.checked_sub(self.origin).map(|d| d / CHUNK_LEN as u64)
    }

    fn chunk(&self, no: u64) -> Option<&Chunk> {
        let idx = usize::try_from(no.checked_sub(self.front_chunk)?).ok()?;
        match idx.cmp(&self.sealed.len()) {
            Ordering::Less => self.sealed.get(idx).map(Arc::as_ref),
            Ordering::Equal => Some(self.tail.as_ref()),
            Ordering::Greater => None,
        }
    }

    fn get(&self, height: u64) -> Option<&WindowEntry> {
        let d = height.checked_sub(self.origin)?;
        let offset = usize::try_from(d % CHUNK_LEN as u64).ok()?;
        self.chunk(d / CHUNK_LEN as u64)?.entries.get(offset).filter(|e| e.height == height)
    }

    fn push(&mut self, e: WindowEntry) {
        if self.tail.is_full() {
            let full = std::mem::take(&mut self.tail);
            Arc::make_mut(&mut self.sealed).push_back(full);
        }
        Arc::make_mut(&mut self.tail).push(e);
    }

    /// Verwirft versiegelte Chunks, die komplett unter `oldest` liegen.
    fn drop_below(&mut self, oldest: u64) {
        let Some(first_needed) = self.chunk_no(oldest) else {
            return;
        };
        let n = first_needed.saturating_sub(self.front_chunk).min(self.sealed.len() as u64);
        if n > 0 {
            let sealed = Arc::make_mut(&mut self.sealed);
            for _ in 0..n {
                sealed.pop_front();
            }
            self.front_chunk += n;
        }
    }

    /// Präfix bis einschließlich `last`; geteilte Chunks bleiben geteilt.
    fn truncated(&self, last: u64) -> Option<Self> {
        let no = self.chunk_no(last)?;
        let keep = usize::try_from(no.checked_sub(self.front_chunk)?).ok()?;
        let tail = self.chunk(no)?.truncated(last);
        let sealed: VecDeque<Arc<Chunk>> = self.sealed.iter().take(keep).cloned().collect();
        Some(Self {
            origin: self.origin,
            front_chunk: self.front_chunk,
            sealed: Arc::new(sealed),
            tail: Arc::new(tail),
        })
    }
}

/// Unveränderliche Sicht auf ein Fenster; billig klonbar und `Send + Sync`.
#[derive(Clone, Debug)]
pub struct LedgerSnapshot {
    params: LedgerParams,
    next_height: u64,
    // älteste gehaltene Höhe (Fenster plus Fork-Reserve)
    oldest: u64,
    tip: BlockId,
    store: ChunkStore,
    root: OnceLock<Hash32>,
}

impl LedgerSnapshot {
    pub fn params(&self) -> LedgerParams {
        self.params
    }

    pub fn window_size(&self) -> usize {
        self.params.window_size
    }

    /// Höhe, die der nächste Header haben muss
    pub fn next_height(&self) -> u64 {
        self.next_height
    }

    pub fn tip_id(&self) -> BlockId {
        self.tip
    }

    pub fn tip_height(&self) -> Option<u64> {
        (self.next_height > self.oldest).then(|| self.next_height - 1)
    }

    fn held_len(&self) -> u64 {
        self.next_height.saturating_sub(self.oldest)
    }

    pub fn window_len(&self) -> usize {
        usize::try_from(self.held_len()).unwrap_or(usize::MAX).min(self.params.window_size)
    }

    /// Fenster noch nicht gefüllt (Kette kürzer als N)
    pub fn is_underflow(&self) -> bool {
        self.window_len() < self.params.window_size
    }

    fn window_start(&self) -> u64 {
        self.next_height.saturating_sub(self.window_len() as u64)
    }

    // gehaltener Eintrag, auch unterhalb des Fensters
    fn held(&self, height: u64) -> Option<&WindowEntry> {
        if height < self.oldest || height >= self.next_height {
            return None;
        }
        self.store.get(height)
    }

    pub fn window(&self) -> impl Iterator<Item = &WindowEntry> + '_ {
        (self.window_start()..self.next_height).filter_map(move |h| self.store.get(h))
    }

    pub fn entry_at(&self, height: u64) -> Option<&WindowEntry> {
        if height < self.window_start() {
            return None;
        }
        self.held(height)
    }

    /// (height, prev_hash) des frühesten Vorkommens im Fenster
    pub fn lookup(&self, commitment: &Commitment) -> Result<(u64, BlockId), LedgerError> {
        let start = self.window_start();
        let not_found = LedgerError::NotFound(*commitment);
        let (Some(first), Some(last)) =
            (self.store.chunk_no(start), self.next_height.checked_sub(1).and_then(|h| self.store.chunk_no(h)))
        else {
            return Err(not_found);
        };
        (first..=last)
            .filter_map(|no| self.store.chunk(no)?.index.get(commitment))
            .find_map(|hs| hs.iter().find(|h| **h >= start))
            .and_then(|h| self.held(*h))
            .map(|e| (e.height, e.prev_hash))
            .ok_or(not_found)
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.lookup(commitment).is_ok()
    }

    pub fn window_commitments(&self) -> Vec<Hash32> {
        self.window().map(|e| e.commitment.0).collect()
    }

    /// Merkle-Root über die Fenster-Commitments in Höhenreihenfolge
    pub fn window_root(&self) -> Hash32 {
        *self.root.get_or_init(|| merkle_root_hashes(&self.window_commitments()))
    }
}

/// Schreibbares Ledger eines Chain-Tips.
#[derive(Clone, Debug)]
pub struct CommitmentLedger {
    view: LedgerSnapshot,
}

impl CommitmentLedger {
    /// Leeres Ledger, erwartet Höhe 0 mit prev_hash = 0
    pub fn genesis(params: LedgerParams) -> Self {
        Self::resume(params, 0, BlockId::default())
    }

    /// Start mitten in der Kette: ältere Commitments sind nicht bekannt.
    pub fn resume(params: LedgerParams, next_height: u64, tip: BlockId) -> Self {
        Self {
            view: LedgerSnapshot {
                params,
                next_height,
                oldest: next_height,
                tip,
                store: ChunkStore::new(next_height),
                root: OnceLock::new(),
            },
        }
    }

    pub fn view(&self) -> &LedgerSnapshot {
        &self.view
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.view.clone()
    }

    pub fn next_height(&self) -> u64 {
        self.view.next_height
    }

    pub fn tip_id(&self) -> BlockId {
        self.view.tip
    }

    pub fn lookup(&self, commitment: &Commitment) -> Result<(u64, BlockId), LedgerError> {
        self.view.lookup(commitment)
    }

    /// Hängt einen Header an und verdrängt Einträge älter als N (+ Fork-Reserve).
    pub fn append(&mut self, header: &BlockHeader) -> Result<BlockId, LedgerError> {
        let v = &mut self.view;
        let expected = v.next_height;
        if header.height != expected {
            return Err(LedgerError::WindowCorrupt { expected, got: header.height });
        }
        if header.prev_hash != v.tip {
            return Err(LedgerError::ParentMismatch {
                height: header.height,
                expected: v.tip,
                got: header.prev_hash,
            });
        }
        let id = header.id().map_err(LedgerError::Malformed)?;
        v.store.push(WindowEntry {
            height: header.height,
            prev_hash: header.prev_hash,
            commitment: header.commitment,
            id,
        });
        v.next_height = expected.saturating_add(1);
        v.tip = id;
        v.root = OnceLock::new();

        let oldest = v.next_height.saturating_sub(v.params.retained()).max(v.oldest);
        for h in v.oldest..oldest {
            if let Some(old) = v.store.get(h) {
                debug!(height = old.height, commitment = %old.commitment, "ledger entry evicted");
            }
        }
        v.oldest = oldest;
        v.store.drop_below(oldest);
        Ok(id)
    }

    /// Ledger mit Präfix ≤ `height`; dieses Ledger bleibt unverändert.
    pub fn fork_at(&self, height: u64) -> Result<Self, LedgerError> {
        let tip_height = self.view.tip_height().ok_or(LedgerError::UnknownHeight(height))?;
        if height > tip_height {
            return Err(LedgerError::UnknownHeight(height));
        }
        if height == tip_height {
            return Ok(self.clone());
        }
        let oldest = self.view.oldest;
        let needed = (height + 1)
            .saturating_sub(self.view.params.window_size as u64)
            .max(self.view.store.origin);
        if needed < oldest || height < oldest {
            return Err(LedgerError::ForkTooDeep { height, oldest_retained: oldest });
        }
        let fork_tip = self.view.held(height).ok_or(LedgerError::UnknownHeight(height))?.id;
        let store = self.view.store.truncated(height).ok_or(LedgerError::UnknownHeight(height))?;
        debug!(fork_height = height, old_tip = tip_height, tip = %fork_tip, "ledger fork");
        Ok(Self {
            view: LedgerSnapshot {
                params: self.view.params,
                next_height: height + 1,
                oldest,
                tip: fork_tip,
                store,
                root: OnceLock::new(),
            },
        })
    }
}
