//! Bounded breadth-first exploration of the address graph
//!
//! The frontier owns the visited set and the pending queue. Addresses are
//! marked visited when admitted, so an address is explored at most once per
//! run however many transactions mention it.
//!
//! ```text
//! IDLE --begin_round--> EXPANDING --finish_round--> IDLE
//!   |                                                 |
//!   +--- empty queue or round limit ---> EXHAUSTED <--+
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontierState {
    Idle,
    Expanding,
    Exhausted,
}

impl fmt::Display for FrontierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FrontierState::Idle => "IDLE",
            FrontierState::Expanding => "EXPANDING",
            FrontierState::Exhausted => "EXHAUSTED",
        };
        f.write_str(s)
    }
}

/// What a round did to the frontier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundReport {
    /// 1-based round number
    pub round: u32,
    /// Addresses dequeued for this round
    pub explored: usize,
    /// Addresses admitted, in admission order
    pub admitted: Vec<String>,
    /// Candidates dropped by the per-round or per-run cap
    pub truncated: usize,
    /// Candidates already visited
    pub already_visited: usize,
}

/// Breadth-first frontier with per-round and per-run caps
#[derive(Debug)]
pub struct DiscoveryFrontier {
    config: DiscoveryConfig,
    state: FrontierState,
    visited: HashSet<String>,
    pending: VecDeque<String>,
    rounds_completed: u32,
    total_admitted: usize,
    total_truncated: usize,
    current: Option<RoundReport>,
}

impl DiscoveryFrontier {
    /// Load seeds into the visited set and the pending queue.
    ///
    /// Duplicate seeds are dropped; seeds count toward `max_total_addresses`.
    pub fn new(config: DiscoveryConfig, seeds: impl IntoIterator<Item = String>) -> Self {
        let mut frontier = Self {
            config,
            state: FrontierState::Idle,
            visited: HashSet::new(),
            pending: VecDeque::new(),
            rounds_completed: 0,
            total_admitted: 0,
            total_truncated: 0,
            current: None,
        };

        for seed in seeds {
            if frontier.visited.contains(&seed) {
                continue;
            }
            if frontier.total_admitted >= frontier.config.max_total_addresses {
                frontier.total_truncated += 1;
                continue;
            }
            frontier.visited.insert(seed.clone());
            frontier.pending.push_back(seed);
            frontier.total_admitted += 1;
        }

        if frontier.total_truncated > 0 {
            warn!(
                "{} seeds dropped by max_total_addresses ({})",
                frontier.total_truncated, frontier.config.max_total_addresses
            );
        }

        frontier
    }

    pub fn state(&self) -> FrontierState {
        self.state
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn total_truncated(&self) -> usize {
        self.total_truncated
    }

    pub fn is_visited(&self, address: &str) -> bool {
        self.visited.contains(address)
    }

    /// Start the next round and dequeue its batch.
    ///
    /// Returns `None` once the frontier is exhausted. A round that starts
    /// with nothing pending is counted and exhausts the frontier.
    pub fn begin_round(&mut self) -> Option<Vec<String>> {
        match self.state {
            FrontierState::Exhausted => return None,
            FrontierState::Expanding => {
                warn!("begin_round called while a round is open, closing it");
                self.finish_round();
                return self.begin_round();
            }
            FrontierState::Idle => {}
        }

        if self.rounds_completed >= self.config.max_rounds {
            info!(
                rounds = self.rounds_completed,
                pending = self.pending.len(),
                "Round limit reached"
            );
            self.state = FrontierState::Exhausted;
            return None;
        }

        if self.pending.is_empty() {
            self.rounds_completed += 1;
            info!(round = self.rounds_completed, "No new addresses to explore");
            self.state = FrontierState::Exhausted;
            return None;
        }

        let take = self.config.addresses_per_round.min(self.pending.len());
        let batch: Vec<String> = self.pending.drain(..take).collect();

        self.state = FrontierState::Expanding;
        self.current = Some(RoundReport {
            round: self.rounds_completed + 1,
            explored: batch.len(),
            ..Default::default()
        });

        debug!(
            round = self.rounds_completed + 1,
            batch = batch.len(),
            backlog = self.pending.len(),
            "Round started"
        );

        Some(batch)
    }

    /// Offer candidate addresses discovered during the open round.
    ///
    /// Returns the addresses actually admitted.
    pub fn admit<I>(&mut self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut admitted = Vec::new();
        let Some(report) = self.current.as_mut() else {
            warn!("admit called outside a round, ignoring candidates");
            return admitted;
        };

        for candidate in candidates {
            if self.visited.contains(&candidate) {
                report.already_visited += 1;
                continue;
            }
            if report.admitted.len() >= self.config.max_new_per_round
                || self.total_admitted >= self.config.max_total_addresses
            {
                report.truncated += 1;
                continue;
            }
            self.visited.insert(candidate.clone());
            self.pending.push_back(candidate.clone());
            self.total_admitted += 1;
            report.admitted.push(candidate.clone());
            admitted.push(candidate);
        }

        admitted
    }

    /// Close the open round and return its report
    pub fn finish_round(&mut self) -> RoundReport {
        let report = self.current.take().unwrap_or_default();
        if self.state == FrontierState::Expanding {
            self.rounds_completed += 1;
            self.state = FrontierState::Idle;
        }
        self.total_truncated += report.truncated;

        info!(
            round = report.round,
            explored = report.explored,
            discovered = report.admitted.len(),
            truncated = report.truncated,
            pending = self.pending.len(),
            "Round complete"
        );

        report
    }

    /// Close the open round without counting it.
    ///
    /// `unexplored` goes back to the head of the queue, still marked visited,
    /// so it shows up as pending work.
    pub fn abandon_round(&mut self, unexplored: Vec<String>) -> RoundReport {
        let report = self.current.take().unwrap_or_default();
        let returned = unexplored.len();
        for address in unexplored.into_iter().rev() {
            self.pending.push_front(address);
        }
        if self.state == FrontierState::Expanding {
            self.state = FrontierState::Idle;
        }
        self.total_truncated += report.truncated;

        warn!(
            round = report.round,
            explored = report.explored.saturating_sub(returned),
            unexplored = returned,
            pending = self.pending.len(),
            "Round abandoned"
        );

        report
    }

    /// Stop exploring; pending addresses stay unexplored
    pub fn exhaust(&mut self) {
        if self.state == FrontierState::Expanding {
            self.finish_round();
        }
        self.state = FrontierState::Exhausted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_rounds: u32, per_round: usize, max_new: usize, max_total: usize) -> DiscoveryConfig {
        DiscoveryConfig {
            max_rounds,
            addresses_per_round: per_round,
            max_new_per_round: max_new,
            max_total_addresses: max_total,
            signatures_per_address: 10,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_seeds_are_visited_and_deduplicated() {
        let frontier = DiscoveryFrontier::new(config(3, 10, 5, 100), strings(&["X", "Y", "X"]));
        assert_eq!(frontier.pending_len(), 2);
        assert!(frontier.is_visited("X"));
        assert!(frontier.is_visited("Y"));
        assert_eq!(frontier.state(), FrontierState::Idle);
    }

    #[test]
    fn test_address_enqueued_at_most_once() {
        let mut frontier = DiscoveryFrontier::new(config(10, 10, 100, 1000), strings(&["X"]));
        let mut enqueued: Vec<String> = Vec::new();

        while let Some(batch) = frontier.begin_round() {
            for address in &batch {
                // Every address points at every other name in a small universe
                let candidates = strings(&["X", "A", "B", "C", address.as_str()]);
                enqueued.extend(frontier.admit(candidates.clone()));
                enqueued.extend(frontier.admit(candidates));
            }
            frontier.finish_round();
        }

        let mut sorted = enqueued.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), enqueued.len());
        assert_eq!(sorted, strings(&["A", "B", "C"]));
        assert_eq!(frontier.state(), FrontierState::Exhausted);
    }

    #[test]
    fn test_round_cap_truncates_without_marking_visited() {
        let mut frontier = DiscoveryFrontier::new(config(5, 10, 2, 1000), strings(&["X"]));
        frontier.begin_round().unwrap();
        let admitted = frontier.admit(strings(&["A", "B", "C", "D"]));
        assert_eq!(admitted, strings(&["A", "B"]));
        assert!(!frontier.is_visited("C"));

        let report = frontier.finish_round();
        assert_eq!(report.truncated, 2);
        assert_eq!(frontier.total_truncated(), 2);

        // C may still be admitted in a later round
        frontier.begin_round().unwrap();
        assert_eq!(frontier.admit(strings(&["C"])), strings(&["C"]));
    }

    #[test]
    fn test_run_cap_includes_seeds() {
        let mut frontier = DiscoveryFrontier::new(config(5, 10, 10, 3), strings(&["X", "Y"]));
        frontier.begin_round().unwrap();
        assert_eq!(frontier.admit(strings(&["A", "B"])), strings(&["A"]));
        assert_eq!(frontier.visited_len(), 3);
    }

    #[test]
    fn test_dequeue_cap_leaves_backlog() {
        let mut frontier = DiscoveryFrontier::new(config(5, 2, 5, 100), strings(&["A", "B", "C"]));
        assert_eq!(frontier.begin_round().unwrap(), strings(&["A", "B"]));
        frontier.finish_round();
        assert_eq!(frontier.begin_round().unwrap(), strings(&["C"]));
    }

    #[test]
    fn test_round_limit_exhausts() {
        let mut frontier = DiscoveryFrontier::new(config(1, 10, 5, 100), strings(&["X"]));
        frontier.begin_round().unwrap();
        frontier.admit(strings(&["A"]));
        frontier.finish_round();

        assert!(frontier.begin_round().is_none());
        assert_eq!(frontier.state(), FrontierState::Exhausted);
        assert_eq!(frontier.rounds_completed(), 1);
        assert_eq!(frontier.pending_len(), 1);
    }

    #[test]
    fn test_empty_round_ends_exploration() {
        let mut frontier = DiscoveryFrontier::new(config(10, 10, 5, 100), strings(&["X"]));
        frontier.begin_round().unwrap();
        frontier.finish_round();

        assert!(frontier.begin_round().is_none());
        assert_eq!(frontier.rounds_completed(), 2);
        // Stays exhausted
        assert!(frontier.begin_round().is_none());
        assert_eq!(frontier.rounds_completed(), 2);
    }

    #[test]
    fn test_admit_outside_round_is_ignored() {
        let mut frontier = DiscoveryFrontier::new(config(3, 10, 5, 100), strings(&["X"]));
        assert!(frontier.admit(strings(&["A"])).is_empty());
        assert!(!frontier.is_visited("A"));
    }

    #[test]
    fn test_abandoned_round_is_not_counted() {
        let mut frontier = DiscoveryFrontier::new(config(5, 10, 5, 100), strings(&["A", "B", "C"]));
        assert_eq!(frontier.begin_round().unwrap(), strings(&["A", "B", "C"]));
        frontier.admit(strings(&["D"]));

        frontier.abandon_round(strings(&["B", "C"]));
        assert_eq!(frontier.rounds_completed(), 0);
        assert_eq!(frontier.state(), FrontierState::Idle);
        assert_eq!(frontier.pending_len(), 3);
        assert!(frontier.is_visited("B"));

        // Unexplored addresses go first next time
        assert_eq!(frontier.begin_round().unwrap(), strings(&["B", "C", "D"]));

        frontier.exhaust();
        assert_eq!(frontier.rounds_completed(), 1);
        assert_eq!(frontier.state(), FrontierState::Exhausted);
    }
}
