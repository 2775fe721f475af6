// SPDX-License-Identifier: AGPL-3.0-only

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetError {
    /// Deterministisches Schritt-Limit überschritten
    Exhausted { limit: u64 },
    /// Von außen abgebrochen (z. B. Wall-Clock-Timeout der Pipeline)
    Cancelled,
}

impl core::fmt::Display for BudgetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exhausted { limit } => write!(f, "step budget of {limit} exhausted"),
            Self::Cancelled => write!(f, "verification cancelled"),
        }
    }
}
impl std::error::Error for BudgetError {}

/// Geteiltes Abbruch-Flag; Clones sehen denselben Zustand.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Schritt-Budget für beschränkte Primitive (v. a. ZK-Verifikation).
#[derive(Clone, Debug)]
pub struct StepBudget {
    max_steps: u64,
    cancel: CancelFlag,
}

impl StepBudget {
    pub fn new(max_steps: u64, cancel: CancelFlag) -> Self {
        Self { max_steps, cancel }
    }

    pub fn unlimited() -> Self {
        Self::new(u64::MAX, CancelFlag::new())
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn check_cancelled(&self) -> Result<(), BudgetError> {
        if self.cancel.is_cancelled() {
            return Err(BudgetError::Cancelled);
        }
        Ok(())
    }

    pub fn meter(&self) -> StepMeter<'_> {
        StepMeter { budget: self, used: 0 }
    }
}

/// Zähler für einen einzelnen Primitive-Aufruf.
pub struct StepMeter<'a> {
    budget: &'a StepBudget,
    used: u64,
}

impl StepMeter<'_> {
    pub fn charge(&mut self, steps: u64) -> Result<(), BudgetError> {
        self.budget.check_cancelled()?;
        let next = self.used.saturating_add(steps);
        if next > self.budget.max_steps {
            return Err(BudgetError::Exhausted { limit: self.budget.max_steps });
        }
        self.used = next;
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_exhausts_at_limit() {
        let b = StepBudget::new(10, CancelFlag::new());
        let mut m = b.meter();
        assert!(m.charge(6).is_ok());
        assert!(m.charge(4).is_ok());
        assert_eq!(m.used(), 10);
        assert_eq!(m.charge(1), Err(BudgetError::Exhausted { limit: 10 }));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let b = StepBudget::new(100, flag.clone());
        assert!(b.check_cancelled().is_ok());
        flag.cancel();
        assert_eq!(b.meter().charge(1), Err(BudgetError::Cancelled));
    }
}
