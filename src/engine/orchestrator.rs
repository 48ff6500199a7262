//! Run driver
//!
//! connect -> verify connectivity -> classify seeds -> rounds of
//! {classify + expand} until the frontier is exhausted -> summary.
//!
//! Work inside a round runs concurrently across addresses. The frontier and
//! the sink are only touched by the driving task as results arrive, and a
//! round is fully drained before the next one starts. Each address's history
//! is fetched once and shared by classification and expansion.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::summary::{RunSummary, Termination};
use crate::analysis::analyzer::validate_address;
use crate::analysis::{WalletAnalyzer, WalletRecord};
use crate::config::DiscoveryConfig;
use crate::discovery::{fetch_history, DiscoveryFrontier, Neighbors};
use crate::error::{Error, FailureKind, Result};
use crate::output::{ResultSink, SinkOutcome};
use crate::rpc::Ledger;

/// State owned by a single run
pub struct RunContext {
    pub run_id: Uuid,
    pub frontier: DiscoveryFrontier,
    pub sink: ResultSink,
    pub summary: RunSummary,
}

/// What expanding one address produced
enum Expansion {
    /// Not attempted (invalid address)
    Skipped,
    /// History could not be fetched
    Failed,
    Found(Neighbors),
}

/// Result of processing one address
struct AddressOutcome {
    address: String,
    analysis: Result<Option<WalletRecord>>,
    expansion: Expansion,
}

/// Why a round stopped early
enum RoundAbort {
    Stopped(Termination),
    ConnectivityLost,
}

pub struct Orchestrator {
    ledger: Arc<dyn Ledger>,
    analyzer: Arc<WalletAnalyzer>,
    discovery: DiscoveryConfig,
    workers: usize,
    deadline: Option<Duration>,
    /// Names of the configured endpoints, for the connectivity error
    endpoint_names: Vec<String>,
    print_results: bool,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        analyzer: Arc<WalletAnalyzer>,
        discovery: DiscoveryConfig,
        workers: usize,
    ) -> Self {
        Self {
            ledger,
            analyzer,
            discovery,
            workers: workers.max(1),
            deadline: None,
            endpoint_names: Vec::new(),
            print_results: false,
        }
    }

    /// Stop the run once `deadline` has elapsed
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_endpoint_names(mut self, names: Vec<String>) -> Self {
        self.endpoint_names = names;
        self
    }

    /// Print each smart wallet to stdout as it is found
    pub fn with_console_output(mut self, enabled: bool) -> Self {
        self.print_results = enabled;
        self
    }

    /// Execute a full run.
    ///
    /// Fails when no endpoint is reachable, at startup or after every
    /// endpoint dropped out mid-run, or when the output cannot be created.
    /// Rows written before a mid-run failure stay in the output.
    /// Per-address failures are counted in the summary.
    pub async fn run(&self, seeds: Vec<String>, output: &Path, cancel: CancellationToken) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let deadline = self.deadline.map(|d| Instant::now() + d);

        info!(run_id = %run_id, seeds = seeds.len(), "Starting discovery run");

        self.verify_connectivity().await?;

        let sink = ResultSink::initialize(output, self.analyzer.thresholds()).await?;
        let mut ctx = RunContext {
            run_id,
            frontier: DiscoveryFrontier::new(self.discovery.clone(), seeds),
            summary: RunSummary::new(run_id, output.to_path_buf(), self.analyzer.strategy_name()),
            sink,
        };

        let outcome = self.drive(&mut ctx, &cancel, deadline).await;

        ctx.frontier.exhaust();
        let stats = ctx.sink.close().await;

        let termination = match outcome {
            Ok(termination) => termination,
            Err(e) => {
                error!(
                    run_id = %ctx.run_id,
                    rounds = ctx.frontier.rounds_completed(),
                    rows_written = stats.written,
                    pending = ctx.frontier.pending_len(),
                    error = %e,
                    "Discovery run aborted"
                );
                return Err(e);
            }
        };

        let mut summary = ctx.summary;
        summary.termination = termination;
        summary.rounds = ctx.frontier.rounds_completed();
        summary.truncated = ctx.frontier.total_truncated();
        summary.pending = ctx.frontier.pending_len();
        summary.rows_written = stats.written;
        for _ in 0..stats.dropped {
            summary.record_skip(FailureKind::Persistence);
        }
        summary.finished_at = Some(chrono::Utc::now());

        info!(
            run_id = %ctx.run_id,
            termination = %termination,
            rounds = summary.rounds,
            explored = summary.explored,
            smart = summary.smart,
            skipped = summary.total_skipped(),
            "Discovery run finished"
        );

        Ok(summary)
    }

    async fn verify_connectivity(&self) -> Result<()> {
        let reachable = self.ledger.probe_endpoints().await;
        if reachable == 0 {
            return Err(Error::Connectivity(format!(
                "tried {}; check network access, proxy settings and endpoint credentials",
                self.tried_endpoints()
            )));
        }
        info!("{} endpoint(s) reachable", reachable);
        Ok(())
    }

    fn tried_endpoints(&self) -> String {
        if self.endpoint_names.is_empty() {
            "all configured endpoints".to_string()
        } else {
            self.endpoint_names.join(", ")
        }
    }

    /// Run rounds until the frontier is exhausted or the run is stopped
    async fn drive(
        &self,
        ctx: &mut RunContext,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<Termination> {
        loop {
            if let Some(reason) = stop_reason(cancel, deadline) {
                return Ok(reason);
            }

            if ctx.frontier.rounds_completed() > 0 {
                let revived = self.ledger.revive_endpoints().await;
                if revived > 0 {
                    debug!(revived, "Endpoints back in rotation");
                }
            }

            let Some(batch) = ctx.frontier.begin_round() else {
                break;
            };
            let round = ctx.frontier.rounds_completed() + 1;
            info!(round, addresses = batch.len(), "Starting round");

            let mut unprocessed: HashSet<String> = batch.iter().cloned().collect();
            let abort = {
                let mut outcomes = stream::iter(batch.clone())
                    .map(|address| self.process(address))
                    .buffer_unordered(self.workers);

                loop {
                    tokio::select! {
                        biased;
                        reason = wait_for_stop(cancel, deadline) => {
                            warn!(round, "Run stopped ({}), abandoning in-flight work", reason);
                            break Some(RoundAbort::Stopped(reason));
                        }
                        next = outcomes.next() => {
                            let Some(outcome) = next else {
                                break None;
                            };
                            unprocessed.remove(&outcome.address);
                            if self.handle(ctx, outcome).await && !self.recover_endpoints().await {
                                break Some(RoundAbort::ConnectivityLost);
                            }
                        }
                    }
                }
            };

            let Some(abort) = abort else {
                ctx.frontier.finish_round();
                continue;
            };

            let unexplored: Vec<String> = batch.into_iter().filter(|a| unprocessed.contains(a)).collect();
            ctx.frontier.abandon_round(unexplored);

            return match abort {
                RoundAbort::Stopped(reason) => Ok(reason),
                RoundAbort::ConnectivityLost => Err(Error::Connectivity(format!(
                    "lost every endpoint during round {} ({}); results so far are in {}",
                    round,
                    self.tried_endpoints(),
                    ctx.sink.path().display()
                ))),
            };
        }

        if ctx.frontier.pending_len() > 0 {
            Ok(Termination::RoundLimit)
        } else {
            Ok(Termination::Exhausted)
        }
    }

    /// Health-check unhealthy endpoints again after an address found none left
    async fn recover_endpoints(&self) -> bool {
        let revived = self.ledger.revive_endpoints().await;
        if revived == 0 {
            error!("No RPC endpoint left healthy and none recovered");
            return false;
        }
        info!(revived, "Endpoints recovered, continuing");
        true
    }

    /// Fetch one address's history, then classify and expand it
    async fn process(&self, address: String) -> AddressOutcome {
        if let Err(e) = validate_address(&address) {
            return AddressOutcome {
                address,
                analysis: Err(e),
                expansion: Expansion::Skipped,
            };
        }

        let expand_limit = self.discovery.signatures_per_address;
        let signature_limit = self.analyzer.tx_limit().max(expand_limit);
        let detail_limit = if self.analyzer.needs_transaction_details() {
            signature_limit
        } else {
            expand_limit
        };

        match fetch_history(self.ledger.as_ref(), &address, signature_limit, detail_limit).await {
            Ok(history) => {
                let analysis = self.analyzer.analyze_history(&history).await;
                AddressOutcome {
                    address,
                    analysis,
                    expansion: Expansion::Found(history.neighbors(expand_limit)),
                }
            }
            Err(e) => AddressOutcome {
                address,
                analysis: Err(e),
                expansion: Expansion::Failed,
            },
        }
    }

    /// Fold one address outcome into the run state.
    ///
    /// Returns true when the address failed for lack of any healthy endpoint.
    async fn handle(&self, ctx: &mut RunContext, outcome: AddressOutcome) -> bool {
        let AddressOutcome {
            address,
            analysis,
            expansion,
        } = outcome;
        ctx.summary.explored += 1;
        let mut connectivity_lost = false;

        match analysis {
            Ok(Some(record)) => {
                ctx.summary.analysed += 1;
                if record.is_smart() {
                    ctx.summary.smart += 1;
                    info!(
                        address = %record.address(),
                        balance = record.balance(),
                        win_rate = record.win_rate(),
                        "Smart wallet found"
                    );
                    if ctx.sink.append(&record).await == SinkOutcome::Written && self.print_results {
                        print_smart_wallet(&record);
                    }
                }
            }
            Ok(None) => ctx.summary.inactive += 1,
            Err(e) => {
                let kind = e.failure_kind();
                warn!(address = %address, kind = %kind, error = %e, "Skipping address");
                ctx.summary.record_skip(kind);
                connectivity_lost = kind == FailureKind::Connectivity;
            }
        }

        match expansion {
            Expansion::Found(found) => {
                if found.transactions_skipped > 0 {
                    debug!(
                        address = %address,
                        skipped = found.transactions_skipped,
                        "Some transactions could not be read"
                    );
                }
                let admitted = ctx.frontier.admit(found.accounts);
                debug!(address = %address, admitted = admitted.len(), "Expanded address");
            }
            Expansion::Failed => {
                debug!(address = %address, "Could not expand address");
                ctx.summary.expansion_failures += 1;
            }
            Expansion::Skipped => {}
        }

        connectivity_lost
    }
}

fn stop_reason(cancel: &CancellationToken, deadline: Option<Instant>) -> Option<Termination> {
    if cancel.is_cancelled() {
        return Some(Termination::Interrupted);
    }
    match deadline {
        Some(at) if Instant::now() >= at => Some(Termination::Deadline),
        _ => None,
    }
}

async fn wait_for_stop(cancel: &CancellationToken, deadline: Option<Instant>) -> Termination {
    match deadline {
        Some(at) => tokio::select! {
            _ = cancel.cancelled() => Termination::Interrupted,
            _ = tokio::time::sleep_until(at) => Termination::Deadline,
        },
        None => {
            cancel.cancelled().await;
            Termination::Interrupted
        }
    }
}

fn print_smart_wallet(record: &WalletRecord) {
    println!(
        "SMART {}  balance={:.2} SOL  win_rate={:.2}%  p/l={:.2}  daily={:.1}  hold={:.1}h",
        record.address(),
        record.balance(),
        record.win_rate(),
        record.profit_loss_ratio(),
        record.daily_trades(),
        record.avg_holding_time()
    );
}
