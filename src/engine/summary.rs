//! End-of-run summary

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::FailureKind;

/// Why a run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No new addresses left to explore
    Exhausted,
    /// `max_rounds` reached with addresses still pending
    RoundLimit,
    /// Run-level deadline elapsed
    Deadline,
    /// Interrupted by signal
    Interrupted,
}

impl Termination {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::Exhausted | Termination::RoundLimit | Termination::Deadline => 0,
            Termination::Interrupted => 130,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::Exhausted => "exhausted",
            Termination::RoundLimit => "round limit",
            Termination::Deadline => "deadline",
            Termination::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// Counters for one run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: PathBuf,
    pub strategy: &'static str,
    pub rounds: u32,
    /// Addresses dequeued and processed
    pub explored: usize,
    /// Addresses that produced a wallet record
    pub analysed: usize,
    /// Addresses without any transaction
    pub inactive: usize,
    pub smart: usize,
    pub rows_written: usize,
    /// Addresses skipped, by failure kind
    pub skipped: BTreeMap<FailureKind, usize>,
    /// Addresses whose neighbours could not be listed
    pub expansion_failures: usize,
    /// Candidates dropped by discovery caps
    pub truncated: usize,
    /// Admitted addresses never explored
    pub pending: usize,
    pub termination: Termination,
}

impl RunSummary {
    pub fn new(run_id: Uuid, output: PathBuf, strategy: &'static str) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            finished_at: None,
            output,
            strategy,
            rounds: 0,
            explored: 0,
            analysed: 0,
            inactive: 0,
            smart: 0,
            rows_written: 0,
            skipped: BTreeMap::new(),
            expansion_failures: 0,
            truncated: 0,
            pending: 0,
            termination: Termination::Exhausted,
        }
    }

    pub fn record_skip(&mut self, kind: FailureKind) {
        *self.skipped.entry(kind).or_default() += 1;
    }

    pub fn skipped_for(&self, kind: FailureKind) -> usize {
        self.skipped.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let elapsed = self
            .finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        writeln!(f, "\n=== RUN SUMMARY ===\n")?;
        writeln!(f, "  Run:              {}", self.run_id)?;
        writeln!(f, "  Stopped by:       {} after {:.1}s", self.termination, elapsed)?;
        writeln!(f, "  Strategy:         {}", self.strategy)?;
        writeln!(f, "  Rounds:           {}", self.rounds)?;
        writeln!(f, "  Explored:         {}", self.explored)?;
        writeln!(f, "  Analysed:         {}", self.analysed)?;
        writeln!(f, "  No activity:      {}", self.inactive)?;
        writeln!(f, "  Smart wallets:    {}", self.smart)?;
        writeln!(f, "  Rows written:     {}", self.rows_written)?;
        writeln!(f, "  Skipped:          {}", self.total_skipped())?;
        for kind in FailureKind::ALL {
            writeln!(f, "    {:<16}{}", kind.as_str(), self.skipped_for(kind))?;
        }
        writeln!(f, "  Expansion errors: {}", self.expansion_failures)?;
        writeln!(f, "  Truncated:        {}", self.truncated)?;
        writeln!(f, "  Unexplored:       {}", self.pending)?;
        write!(f, "  Output:           {}", self.output.display())
    }
}
