//! Round-table consensus protocol
//!
//! `Opening -> Debating(1..=max_rounds) -> {Converged, Exhausted}`.
//!
//! The opening round is an ordinary fan-out. Each debate round re-runs every
//! (ticker, analyst) pair with the previous round's statements in the
//! context. An analyst whose call fails keeps its previous statement. Round
//! N+1 is only dispatched after round N has been aggregated.

use crate::aggregate::{ResultAggregator, consensus};
use crate::config::RoundTableConfig;
use crate::fallback::FallbackGenerator;
use crate::progress::ProgressTracker;
use crate::response::{
    AnalystSignal, ConsensusRound, DebateSummary, RenderedSignal, RoundTableOutcome,
    RoundTableResponse, TickerMap,
};
use crate::run::AnalysisRun;
use crate::scheduler::{DispatchReport, TaskScheduler};
use crate::task::TaskStatus;
use panel_core::{Error, Statement};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const RATIO_EPSILON: f64 = 1e-9;

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTableState {
    Opening,
    Debating { round: u32 },
    Converged { round: u32 },
    Exhausted { rounds: u32 },
}

impl RoundTableState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged { .. } | Self::Exhausted { .. })
    }
}

/// Convergence measures for one ticker after a debate round
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerConvergence {
    pub agreement_ratio: f64,
    pub confidence_delta: f64,
}

impl TickerConvergence {
    /// Unanimous enough, or positions barely moved
    pub fn is_converged(&self, config: &RoundTableConfig) -> bool {
        self.agreement_ratio + RATIO_EPSILON >= config.agreement_threshold
            || self.confidence_delta < config.confidence_delta
    }
}

/// Mean absolute per-analyst confidence change between two rounds
pub fn confidence_delta(previous: &[Statement], current: &[Statement]) -> f64 {
    let changes: Vec<f64> = current
        .iter()
        .filter_map(|now| {
            previous
                .iter()
                .find(|before| before.analyst_id == now.analyst_id)
                .map(|before| {
                    (f64::from(now.signal.confidence) - f64::from(before.signal.confidence)).abs()
                })
        })
        .collect();

    if changes.is_empty() {
        return 0.0;
    }
    changes.iter().sum::<f64>() / changes.len() as f64
}

/// Runs the bounded debate on top of a [`TaskScheduler`]
pub struct RoundTableCoordinator {
    scheduler: TaskScheduler,
    aggregator: ResultAggregator,
    config: RoundTableConfig,
}

impl RoundTableCoordinator {
    pub fn new(
        scheduler: TaskScheduler,
        aggregator: ResultAggregator,
        config: RoundTableConfig,
    ) -> Self {
        Self {
            scheduler,
            aggregator,
            config,
        }
    }

    /// Run the opening round and up to `max_rounds` debate rounds
    ///
    /// Returns `Error::Cancelled` if the token fires; everything else is
    /// absorbed into the response.
    pub async fn run(
        &self,
        opening: AnalysisRun,
        tracker: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> Result<RoundTableResponse, Error> {
        let budget = self.scheduler.settings().run_deadline;
        let single_analyst = opening.spec.is_single_analyst();
        let mut state = RoundTableState::Opening;
        let mut run = opening;

        info!(
            run_id = %run.id,
            max_rounds = self.config.max_rounds,
            "Round table opening"
        );

        let context = run.context();
        let report = self.scheduler.dispatch(&mut run, &context, tracker, cancel).await;
        check_cancelled(&report)?;
        let mut partial = report.deadline_elapsed;
        if partial {
            FallbackGenerator::backfill(&mut run, tracker);
        }

        let mut current = ResultAggregator::statements(&run);
        let opening_statements = current.clone();
        let mut rounds = vec![ConsensusRound {
            round_number: 0,
            per_agent_statement: self.aggregator.entries(&current),
            agreement_ratio: min_agreement(&current),
            convergence_delta: None,
            carried_forward: Vec::new(),
        }];

        for round in 1..=self.config.max_rounds {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            state = transition(state, RoundTableState::Debating { round });

            let mut next = run.next_round(budget);
            let mut context = next.context();
            context.set_prior_statements(&by_ticker(&current))?;

            let report = self.scheduler.dispatch(&mut next, &context, tracker, cancel).await;
            check_cancelled(&report)?;
            partial |= report.deadline_elapsed;
            if report.deadline_elapsed {
                FallbackGenerator::backfill(&mut next, tracker);
            }

            let (statements, carried_forward) = carry_forward(&next, &current);

            let mut converged = true;
            let mut agreement_ratio: f64 = 1.0;
            let mut max_delta: f64 = 0.0;
            for (ticker, entries) in statements.iter() {
                let previous = current.get(ticker.as_str()).map_or(&[][..], Vec::as_slice);
                let measures = TickerConvergence {
                    agreement_ratio: consensus(entries.iter().map(|s| &s.signal)).agreement_ratio(),
                    confidence_delta: confidence_delta(previous, entries),
                };
                debug!(
                    run_id = %run.id,
                    round,
                    %ticker,
                    agreement = measures.agreement_ratio,
                    delta = measures.confidence_delta,
                    "Round measures"
                );
                converged &= measures.is_converged(&self.config);
                agreement_ratio = agreement_ratio.min(measures.agreement_ratio);
                max_delta = max_delta.max(measures.confidence_delta);
            }

            rounds.push(ConsensusRound {
                round_number: round,
                per_agent_statement: self.aggregator.entries(&statements),
                agreement_ratio,
                convergence_delta: Some(max_delta),
                carried_forward,
            });
            current = statements;
            run = next;

            if converged {
                state = transition(state, RoundTableState::Converged { round });
                break;
            }
        }

        if !state.is_terminal() {
            state = transition(
                state,
                RoundTableState::Exhausted {
                    rounds: self.config.max_rounds,
                },
            );
        }

        let (outcome, rounds_completed) = match state {
            RoundTableState::Converged { round } => (RoundTableOutcome::Converged, round),
            _ => (RoundTableOutcome::Exhausted, self.config.max_rounds),
        };

        info!(
            run_id = %run.id,
            outcome = ?outcome,
            rounds_completed,
            "Round table finished"
        );

        Ok(RoundTableResponse {
            result: self
                .aggregator
                .render(run.id, &current, single_analyst, partial),
            rounds,
            converged: outcome == RoundTableOutcome::Converged,
            outcome,
            rounds_completed,
            summaries: self.summarize(
                &opening_statements,
                &current,
                single_analyst,
                rounds_completed,
            ),
        })
    }

    /// Consensus and dissent per ticker, with who moved since the opening
    fn summarize(
        &self,
        opening: &TickerMap<Vec<Statement>>,
        last: &TickerMap<Vec<Statement>>,
        single_analyst: bool,
        rounds_completed: u32,
    ) -> TickerMap<DebateSummary> {
        let labels = self.aggregator.labels();
        last.map(|ticker, entries| {
            let overall = ResultAggregator::overall(entries, single_analyst);
            let backers = entries
                .iter()
                .filter(|s| s.signal.signal == overall.signal)
                .count();
            let consensus_view = format!(
                "{} ({backers}/{} analysts, confidence {})",
                overall.signal.label(labels),
                entries.len(),
                overall.confidence
            );

            let dissenting_opinions = entries
                .iter()
                .filter(|s| s.signal.signal != overall.signal)
                .map(|s| AnalystSignal {
                    agent_name: s.analyst_id.clone(),
                    signal: RenderedSignal::render(&s.signal, labels),
                })
                .collect();

            let before = opening.get(ticker.as_str()).map_or(&[][..], Vec::as_slice);
            let moves: Vec<String> = entries
                .iter()
                .filter_map(|now| {
                    let then = before.iter().find(|b| b.analyst_id == now.analyst_id)?;
                    (then.signal.signal != now.signal.signal).then(|| {
                        format!(
                            "{} {} -> {}",
                            now.analyst_id,
                            then.signal.signal.label(labels),
                            now.signal.signal.label(labels)
                        )
                    })
                })
                .collect();
            let discussion_summary = if moves.is_empty() {
                format!(
                    "{} analysts held their opening positions over {rounds_completed} debate round(s)",
                    entries.len()
                )
            } else {
                format!(
                    "{} of {} analysts changed position over {rounds_completed} debate round(s): {}",
                    moves.len(),
                    entries.len(),
                    moves.join(", ")
                )
            };

            DebateSummary {
                consensus_view,
                dissenting_opinions,
                discussion_summary,
            }
        })
    }
}

fn transition(from: RoundTableState, to: RoundTableState) -> RoundTableState {
    debug!(from = ?from, to = ?to, "Round table transition");
    to
}

fn check_cancelled(report: &DispatchReport) -> Result<(), Error> {
    if report.cancelled {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// Successful calls give new statements; everything else keeps the prior one
fn carry_forward(
    run: &AnalysisRun,
    previous: &TickerMap<Vec<Statement>>,
) -> (TickerMap<Vec<Statement>>, Vec<String>) {
    let mut carried = Vec::new();
    let mut statements = TickerMap::new();

    for ticker in &run.spec.tickers {
        let prior = previous.get(ticker.as_str());
        let entries = run
            .tasks()
            .filter(|task| &task.key.ticker == ticker)
            .map(|task| {
                let analyst = &task.key.analyst_id;
                let kept = prior.and_then(|p| p.iter().find(|s| &s.analyst_id == analyst));
                match (&task.status, &task.result, kept) {
                    (TaskStatus::Succeeded, Some(signal), _) => {
                        Statement::new(analyst.clone(), signal.clone())
                    }
                    (_, _, Some(kept)) => {
                        if !carried.contains(analyst) {
                            carried.push(analyst.clone());
                        }
                        kept.clone()
                    }
                    (_, _, None) => {
                        Statement::new(analyst.clone(), crate::aggregate::resolve_signal(task))
                    }
                }
            })
            .collect();
        statements.insert(ticker.clone(), entries);
    }

    (statements, carried)
}

fn by_ticker(statements: &TickerMap<Vec<Statement>>) -> HashMap<String, Vec<Statement>> {
    statements
        .iter()
        .map(|(ticker, entries)| (ticker.to_string(), entries.clone()))
        .collect()
}

fn min_agreement(statements: &TickerMap<Vec<Statement>>) -> f64 {
    statements
        .iter()
        .map(|(_, entries)| consensus(entries.iter().map(|s| &s.signal)).agreement_ratio())
        .fold(1.0, f64::min)
}
