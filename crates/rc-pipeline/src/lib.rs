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

//! Validierungs-Pipeline: konkurrierende Tips werden parallel geprüft, die
//! Fork-Choice läuft erst, wenn alle Blöcke aller Kandidaten entschieden sind.
//!
//! Nach Ablauf der Deadline wartet die Pipeline nicht weiter: offene Blöcke
//! gelten als `TimedOut`, ihre Worker-Threads laufen abgekoppelt aus. Ein
//! Backend, das den `CancelFlag` nie beachtet, belegt seinen Blocking-Thread
//! bis zur eigenen Rückkehr.

use rc_consensus::{
    BlockScore, BlockStatus, CandidateStatus, ChainCandidate, ChainView, ConsensusError,
    ForkChoiceEngine, ForkChoiceError, ProofVerifier, VerifyError,
};
use rc_crypto::{CancelFlag, RingScheme, ZkProofSystem};
use rc_ledger::{CommitmentLedger, LedgerError, LedgerSnapshot};
use rc_types::{BlockHeader, ReputationScore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum PipelineError {
    InvalidConfig(ConsensusError),
    ForkChoice(ForkChoiceError),
    Join(String),
    ChannelClosed,
}

impl core::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidConfig(e) => write!(f, "invalid pipeline config: {e}"),
            Self::ForkChoice(e) => write!(f, "{e}"),
            Self::Join(e) => write!(f, "verification task failed: {e}"),
            Self::ChannelClosed => write!(f, "channel closed"),
        }
    }
}
impl std::error::Error for PipelineError {}

impl From<ForkChoiceError> for PipelineError {
    fn from(e: ForkChoiceError) -> Self {
        Self::ForkChoice(e)
    }
}

/// Ergebnis einer Runde: Wahl plus pro Kandidat Scores und erweitertes Ledger.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub view: ChainView,
    pub candidates: Vec<ChainCandidate>,
    pub ledgers: Vec<CommitmentLedger>,
}

impl PipelineOutcome {
    pub fn winner_ledger(&self) -> Option<&CommitmentLedger> {
        self.ledgers.get(self.view.candidate_index)
    }
}

struct Job {
    candidate: usize,
    block: usize,
    header: BlockHeader,
    snapshot: LedgerSnapshot,
}

pub struct ValidationPipeline<S, Z> {
    verifier: Arc<ProofVerifier<S, Z>>,
    engine: ForkChoiceEngine,
    timeout: Duration,
}

impl<S, Z> Clone for ValidationPipeline<S, Z> {
    fn clone(&self) -> Self {
        Self { verifier: Arc::clone(&self.verifier), engine: self.engine, timeout: self.timeout }
    }
}

impl<S, Z> ValidationPipeline<S, Z>
where
    S: RingScheme + 'static,
    Z: ZkProofSystem + 'static,
{
    pub fn new(verifier: ProofVerifier<S, Z>) -> Result<Self, PipelineError> {
        let engine = ForkChoiceEngine::from_params(verifier.params()).map_err(PipelineError::InvalidConfig)?;
        let timeout = verifier.params().verify_timeout();
        Ok(Self { verifier: Arc::new(verifier), engine, timeout })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn verifier(&self) -> &ProofVerifier<S, Z> {
        &self.verifier
    }

    /// Prüft alle Kandidaten (Header ab dem Tip von `base`, aufsteigend) und wählt einen.
    pub async fn evaluate(
        &self,
        base: &CommitmentLedger,
        candidates: Vec<Vec<BlockHeader>>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let mut statuses: Vec<Vec<Option<BlockStatus>>> = Vec::with_capacity(candidates.len());
        let mut ledgers = Vec::with_capacity(candidates.len());
        let mut jobs = Vec::new();

        // Ledger pro Kandidat sequenziell erweitern: ein Snapshot je Block
        for (ci, headers) in candidates.iter().enumerate() {
            let mut ledger = base.clone();
            let mut st = vec![None; headers.len()];
            for (bi, header) in headers.iter().enumerate() {
                let snapshot = ledger.snapshot();
                if let Err(e) = ledger.append(header) {
                    debug!(candidate = ci, height = header.height, error = %e, "header does not extend candidate");
                    let reason = match e {
                        LedgerError::Malformed(c) => VerifyError::Malformed(c),
                        _ => VerifyError::ContextMismatch { height: header.height, parent: header.prev_hash },
                    };
                    if let Some(slot) = st.get_mut(bi) {
                        *slot = Some(BlockStatus::Invalid(reason));
                    }
                    break;
                }
                // bis ein Ergebnis vorliegt, gilt der Block als nicht rechtzeitig geprüft
                if let Some(slot) = st.get_mut(bi) {
                    *slot = Some(BlockStatus::TimedOut);
                }
                jobs.push(Job { candidate: ci, block: bi, header: header.clone(), snapshot });
            }
            statuses.push(st);
            ledgers.push(ledger);
        }

        let cancel = CancelFlag::new();
        let mut set = JoinSet::new();
        for job in jobs {
            let verifier = Arc::clone(&self.verifier);
            let cancel = cancel.clone();
            set.spawn_blocking(move || {
                let res = verifier.verify_header_with_cancel(&job.header, &job.snapshot, &cancel);
                (job.candidate, job.block, res)
            });
        }

        let mut record = |(ci, bi, res): (usize, usize, Result<ReputationScore, VerifyError>)| {
            if let Some(slot) = statuses.get_mut(ci).and_then(|s| s.get_mut(bi)) {
                *slot = Some(BlockStatus::from(res));
            }
        };

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        loop {
            let expired = tokio::select! {
                next = set.join_next() => match next {
                    Some(Ok(done)) => {
                        record(done);
                        false
                    }
                    Some(Err(e)) => {
                        cancel.cancel();
                        return Err(PipelineError::Join(e.to_string()));
                    }
                    None => break,
                },
                _ = &mut deadline => true,
            };
            if expired {
                warn!(timeout_ms = self.timeout.as_millis() as u64, pending = set.len(), "verification deadline reached");
                cancel.cancel();
                set.detach_all();
                break;
            }
        }

        let scored: Vec<ChainCandidate> = candidates
            .iter()
            .zip(statuses)
            .zip(&ledgers)
            .map(|((headers, st), ledger)| ChainCandidate {
                tip: ledger.tip_id(),
                blocks: headers
                    .iter()
                    .zip(st)
                    // Blöcke hinter einem nicht anhängbaren Header fehlen
                    .filter_map(|(h, s)| {
                        // ohne Kodierung keine Id; solche Blöcke sind ohnehin Invalid
                        let id = h.id().unwrap_or_default();
                        s.map(|status| BlockScore { id, height: h.height, difficulty: h.difficulty, status })
                    })
                    .collect(),
            })
            .collect();

        for (ci, c) in scored.iter().enumerate() {
            match c.status() {
                CandidateStatus::Viable => {
                    info!(candidate = ci, tip = %c.tip, blocks = c.blocks.len(), weight = ?self.engine.chain_weight(c), "candidate verified")
                }
                CandidateStatus::Disqualified { height, reason } => {
                    warn!(candidate = ci, tip = %c.tip, height, reason = %reason, "candidate disqualified")
                }
                CandidateStatus::TimedOut { height } => {
                    warn!(candidate = ci, tip = %c.tip, height, "candidate timed out")
                }
            }
        }

        let view = self.engine.select(&scored)?;
        info!(tip = %view.tip, weight = view.weight, "canonical tip selected");
        Ok(PipelineOutcome { view, candidates: scored, ledgers })
    }
}

pub mod async_svc {
    use super::*;
    use tokio::sync::{mpsc, oneshot};

    pub enum PipelineCmd {
        Evaluate {
            base: CommitmentLedger,
            candidates: Vec<Vec<BlockHeader>>,
            reply: oneshot::Sender<Result<PipelineOutcome, PipelineError>>,
        },
        Shutdown,
    }

    #[derive(Clone)]
    pub struct PipelineService {
        tx: mpsc::Sender<PipelineCmd>,
    }

    impl PipelineService {
        pub async fn evaluate(
            &self,
            base: CommitmentLedger,
            candidates: Vec<Vec<BlockHeader>>,
        ) -> Result<PipelineOutcome, PipelineError> {
            let (reply, rx) = oneshot::channel();
            self.tx
                .send(PipelineCmd::Evaluate { base, candidates, reply })
                .await
                .map_err(|_| PipelineError::ChannelClosed)?;
            rx.await.map_err(|_| PipelineError::ChannelClosed)?
        }

        pub async fn shutdown(&self) -> Result<(), PipelineError> {
            self.tx.send(PipelineCmd::Shutdown).await.map_err(|_| PipelineError::ChannelClosed)
        }
    }

    /// Runden laufen nacheinander; eine Runde nutzt intern alle Worker.
    pub async fn run_pipeline_loop<S, Z>(pipeline: ValidationPipeline<S, Z>, mut rx: mpsc::Receiver<PipelineCmd>)
    where
        S: RingScheme + 'static,
        Z: ZkProofSystem + 'static,
    {
        info!(timeout_ms = pipeline.timeout.as_millis() as u64, "pipeline loop started");
        while let Some(cmd) = rx.recv().await {
            match cmd {
                PipelineCmd::Evaluate { base, candidates, reply } => {
                    let out = pipeline.evaluate(&base, candidates).await;
                    if reply.send(out).is_err() {
                        debug!("pipeline caller went away");
                    }
                }
                PipelineCmd::Shutdown => {
                    info!("pipeline shutdown received");
                    break;
                }
            }
        }
        info!("pipeline loop stopped");
    }

    pub fn spawn<S, Z>(pipeline: ValidationPipeline<S, Z>) -> (PipelineService, tokio::task::JoinHandle<()>)
    where
        S: RingScheme + 'static,
        Z: ZkProofSystem + 'static,
    {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(run_pipeline_loop(pipeline, rx));
        (PipelineService { tx }, handle)
    }
}
