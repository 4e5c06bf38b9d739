//! Ledger rows and the optimization result handed back to callers.

use crate::constraints::SearchMode;
use crate::optimizer::fitness::Simulation;
use crate::shifts::ShiftCatalog;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One row of the day-by-day ledger.
///
/// `end_balance = start_balance + deposit + earnings - expenses + adjustment`
/// holds on every row; `adjustment` is non-zero only on anchored rows (the
/// balance-reset day and fixed-balance days).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySchedule {
    pub day: usize,
    /// Shift names worked that day, empty for a day off
    pub shifts: Vec<String>,
    pub earnings: f64,
    pub expenses: f64,
    pub deposit: f64,
    pub start_balance: f64,
    pub end_balance: f64,
    #[serde(default)]
    pub adjustment: f64,
    #[serde(default)]
    pub anchored: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub notes: String,
}

impl DaySchedule {
    pub fn is_work_day(&self) -> bool {
        !self.shifts.is_empty() || self.earnings > 0.0
    }

    /// End balance implied by the other fields
    pub fn expected_end_balance(&self) -> f64 {
        self.start_balance + self.deposit + self.earnings - self.expenses + self.adjustment
    }

    /// Balance the row would end on without an anchor
    pub fn natural_end_balance(&self) -> f64 {
        self.start_balance + self.deposit + self.earnings - self.expenses
    }
}

/// Why the engine stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Ran every configured generation
    Completed,
    /// Stagnated on a feasible schedule close enough to the target
    Converged,
    /// Stopped through the run control; the result is the best found so far
    Cancelled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::Converged => write!(f, "converged"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Best schedule of a run plus its ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    /// Combination label per day, `None` for a day off
    pub chromosome: Vec<Option<String>>,
    pub work_days: Vec<usize>,
    pub total_earnings: f64,
    pub final_balance: f64,
    pub min_balance: f64,
    pub violations: usize,
    pub computation_time: String,
    pub schedule: Vec<DaySchedule>,
    pub fitness: f64,
    pub mode: SearchMode,
    pub termination: Termination,
    pub generations_run: usize,
    pub seed: u64,
    /// Best fitness at the start of every generation
    #[serde(default)]
    pub fitness_history: Vec<f64>,
}

impl OptimizationResult {
    pub fn is_cancelled(&self) -> bool {
        self.termination == Termination::Cancelled
    }

    pub fn work_day_count(&self) -> usize {
        self.work_days.len()
    }

    /// Recompute the summary fields from the ledger after it was edited
    pub fn refresh_from_schedule(&mut self, minimum_balance: f64) {
        let rows = &self.schedule;
        self.work_days = rows.iter().filter(|r| r.is_work_day()).map(|r| r.day).collect();
        self.total_earnings = rows.iter().map(|r| r.earnings).sum();
        self.min_balance = rows.iter().map(|r| r.end_balance).fold(f64::INFINITY, f64::min);
        self.violations = rows.iter().filter(|r| r.end_balance < minimum_balance).count();
        if let Some(last) = rows.last() {
            self.final_balance = last.end_balance;
        }
    }
}

impl std::fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Schedule ({} mode, {})", self.mode, self.termination)?;
        writeln!(f, "  Fitness: {:.2}", self.fitness)?;
        writeln!(f, "  Final balance: {:.2}", self.final_balance)?;
        writeln!(f, "  Minimum balance: {:.2}", self.min_balance)?;
        writeln!(f, "  Violations: {}", self.violations)?;
        writeln!(f, "  Total earnings: {:.2}", self.total_earnings)?;
        writeln!(f, "  Work days ({}): {:?}", self.work_days.len(), self.work_days)?;
        writeln!(f, "  Generations: {}", self.generations_run)?;
        writeln!(f, "  Time: {}", self.computation_time)
    }
}

/// Format an elapsed time as `"340ms"`, `"12.40s"` or `"2m 5s"`
pub fn format_duration(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Turn a simulated month into ledger rows
pub fn build_ledger(simulation: &Simulation, catalog: &ShiftCatalog) -> Vec<DaySchedule> {
    simulation
        .days
        .iter()
        .map(|trace| {
            let shifts = trace
                .combo
                .map(|id| {
                    catalog
                        .combination(id)
                        .tiers
                        .iter()
                        .map(|&tier| catalog.shift_type(tier).name.clone())
                        .collect()
                })
                .unwrap_or_default();

            DaySchedule {
                day: trace.day,
                shifts,
                earnings: trace.earnings,
                expenses: trace.expenses,
                deposit: trace.deposit,
                start_balance: trace.start_balance,
                end_balance: trace.end_balance,
                adjustment: trace.adjustment,
                anchored: trace.anchored,
                notes: String::new(),
            }
        })
        .collect()
}
