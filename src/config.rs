//! Problem input: run configuration, dated money flows and tuning knobs.
//!
//! A problem is loaded from a single JSON document (camelCase keys):
//!
//! ```json
//! {
//!   "config": {
//!     "startingBalance": 250.0,
//!     "targetEndingBalance": 1500.0,
//!     "minimumBalance": 100.0,
//!     "populationSize": 120,
//!     "generations": 600,
//!     "manualConstraints": { "5": { "shifts": "large" } },
//!     "balanceReset": { "day": 10, "newBalance": 800.0 }
//!   },
//!   "expenses": [ { "day": 1, "amount": 700.0, "description": "rent" } ],
//!   "deposits": [ { "day": 15, "amount": 300.0 } ]
//! }
//! ```

use crate::error::{PlannerError, Result};
use crate::shifts::{ShiftCatalog, ShiftType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Length of the planning horizon; days are numbered `1..=DAYS_IN_MONTH`
pub const DAYS_IN_MONTH: usize = 30;

/// Whether `day` is a valid day index
#[inline]
pub fn is_valid_day(day: usize) -> bool {
    (1..=DAYS_IN_MONTH).contains(&day)
}

/// A bill due on a given day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub day: usize,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

impl Expense {
    pub fn new(day: usize, amount: f64, description: &str) -> Self {
        Expense {
            day,
            amount,
            description: description.to_string(),
        }
    }
}

/// Money arriving on a given day independently of shifts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deposit {
    pub day: usize,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

impl Deposit {
    pub fn new(day: usize, amount: f64, description: &str) -> Self {
        Deposit {
            day,
            amount,
            description: description.to_string(),
        }
    }
}

/// A user override pinned to one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualConstraint {
    /// Shift label worked that day (`"large"`, `"medium+large"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shifts: Option<String>,
    /// Earnings recorded for the day, replacing any shift pay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_earnings: Option<f64>,
    /// Expense total for the day, replacing the aggregated bills
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_expense: Option<f64>,
    /// End-of-day balance the schedule must hit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_balance: Option<f64>,
}

impl ManualConstraint {
    pub fn shift(label: &str) -> Self {
        ManualConstraint {
            shifts: Some(label.to_string()),
            ..Default::default()
        }
    }

    pub fn earnings(amount: f64) -> Self {
        ManualConstraint {
            fixed_earnings: Some(amount),
            ..Default::default()
        }
    }

    pub fn expense(amount: f64) -> Self {
        ManualConstraint {
            fixed_expense: Some(amount),
            ..Default::default()
        }
    }

    pub fn balance(amount: f64) -> Self {
        ManualConstraint {
            fixed_balance: Some(amount),
            ..Default::default()
        }
    }

    /// A locked day is never touched by mutation or crossover
    pub fn is_locked(&self) -> bool {
        self.shifts.is_some() || self.fixed_earnings.is_some() || self.fixed_balance.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_none()
            && self.fixed_earnings.is_none()
            && self.fixed_expense.is_none()
            && self.fixed_balance.is_none()
    }

    /// Overlay the fields set in `other` onto `self`
    pub fn merge(&mut self, other: ManualConstraint) {
        if other.shifts.is_some() {
            self.shifts = other.shifts;
            self.fixed_earnings = None;
        }
        if other.fixed_earnings.is_some() {
            self.fixed_earnings = other.fixed_earnings;
            self.shifts = None;
        }
        if other.fixed_expense.is_some() {
            self.fixed_expense = other.fixed_expense;
        }
        if other.fixed_balance.is_some() {
            self.fixed_balance = other.fixed_balance;
        }
    }
}

/// Overrides the balance at the end of `day`; only later days are optimized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReset {
    pub day: usize,
    pub new_balance: f64,
}

/// Every tunable constant of the search, in one place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvolutionParams {
    /// Random seed; a run is fully reproducible from it
    pub seed: u64,
    /// Per-day resampling probability
    pub mutation_rate: f64,
    /// Share of the population carried over unchanged
    pub elite_fraction: f64,
    /// Lower bound on the elite count (clamped to the population size)
    pub min_elite_count: usize,
    /// Individuals sampled per tournament
    pub tournament_size: usize,
    /// Safety margin above the minimum balance that marks a day critical
    pub buffer_margin: f64,
    /// Emit a progress event every this many generations
    pub progress_interval: usize,
    /// Early stop is never considered before this generation
    pub min_generations_before_stop: usize,
    /// Generations without a significant improvement before stopping
    pub stagnation_limit: usize,
    /// Allowed distance between ending balance and target for early stop
    pub target_tolerance: f64,
    /// Relative improvement that resets the stagnation counter
    pub improvement_threshold: f64,
}

impl Default for EvolutionParams {
    fn default() -> Self {
        EvolutionParams {
            seed: 42,
            mutation_rate: 0.15,
            elite_fraction: 0.2,
            min_elite_count: 30,
            tournament_size: 7,
            buffer_margin: 200.0,
            progress_interval: 50,
            min_generations_before_stop: 300,
            stagnation_limit: 150,
            target_tolerance: 5.0,
            improvement_threshold: 0.01,
        }
    }
}

/// What the caller asks the optimizer for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationConfig {
    pub starting_balance: f64,
    pub target_ending_balance: f64,
    pub minimum_balance: f64,
    pub population_size: usize,
    pub generations: usize,
    #[serde(default)]
    pub manual_constraints: BTreeMap<usize, ManualConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_reset: Option<BalanceReset>,
    #[serde(default)]
    pub params: EvolutionParams,
}

impl OptimizationConfig {
    pub fn new(starting_balance: f64, target_ending_balance: f64, minimum_balance: f64) -> Self {
        OptimizationConfig {
            starting_balance,
            target_ending_balance,
            minimum_balance,
            population_size: 100,
            generations: 500,
            manual_constraints: BTreeMap::new(),
            balance_reset: None,
            params: EvolutionParams::default(),
        }
    }

    /// Reject inputs the engine cannot run on
    pub fn validate(&self) -> Result<()> {
        let money = [
            ("startingBalance", self.starting_balance),
            ("targetEndingBalance", self.target_ending_balance),
            ("minimumBalance", self.minimum_balance),
        ];
        for (field, value) in money {
            if !value.is_finite() {
                return Err(PlannerError::InvalidConfig(format!("{} must be finite", field)));
            }
        }

        if self.population_size < 10 {
            return Err(PlannerError::InvalidConfig(format!(
                "populationSize must be at least 10 (got {})",
                self.population_size
            )));
        }
        if self.generations < 1 {
            return Err(PlannerError::InvalidConfig(
                "generations must be at least 1".to_string(),
            ));
        }

        let p = &self.params;
        if p.tournament_size == 0 {
            return Err(PlannerError::InvalidConfig(
                "tournamentSize must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&p.mutation_rate) {
            return Err(PlannerError::InvalidConfig(format!(
                "mutationRate must be within [0, 1] (got {})",
                p.mutation_rate
            )));
        }
        if !(0.0..=1.0).contains(&p.elite_fraction) {
            return Err(PlannerError::InvalidConfig(format!(
                "eliteFraction must be within [0, 1] (got {})",
                p.elite_fraction
            )));
        }
        if !p.buffer_margin.is_finite() || !p.target_tolerance.is_finite() {
            return Err(PlannerError::InvalidConfig(
                "bufferMargin and targetTolerance must be finite".to_string(),
            ));
        }

        if let Some(reset) = &self.balance_reset {
            if !(1..DAYS_IN_MONTH).contains(&reset.day) {
                return Err(PlannerError::InvalidConfig(format!(
                    "balanceReset.day must be within 1..={} (got {})",
                    DAYS_IN_MONTH - 1,
                    reset.day
                )));
            }
            if !reset.new_balance.is_finite() {
                return Err(PlannerError::InvalidConfig(
                    "balanceReset.newBalance must be finite".to_string(),
                ));
            }
        }

        for (day, constraint) in &self.manual_constraints {
            let values = [
                constraint.fixed_earnings,
                constraint.fixed_expense,
                constraint.fixed_balance,
            ];
            if values.iter().flatten().any(|v| !v.is_finite()) {
                return Err(PlannerError::InvalidConfig(format!(
                    "manual constraint on day {} has a non-finite amount",
                    day
                )));
            }
        }

        Ok(())
    }

    /// Number of individuals copied unchanged into the next generation
    pub fn elite_size(&self) -> usize {
        let by_fraction = (self.population_size as f64 * self.params.elite_fraction).round() as usize;
        by_fraction
            .max(self.params.min_elite_count)
            .min(self.population_size)
    }

    /// Manual constraints on valid days only
    pub fn constraints_in_range(&self) -> impl Iterator<Item = (usize, &ManualConstraint)> {
        self.manual_constraints
            .iter()
            .filter(|(day, _)| is_valid_day(**day))
            .map(|(day, c)| (*day, c))
    }
}

/// A complete optimization request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemInput {
    pub config: OptimizationConfig,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub deposits: Vec<Deposit>,
    /// Custom shift catalog; the standard one is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shifts: Option<Vec<ShiftType>>,
}

impl ProblemInput {
    pub fn new(config: OptimizationConfig) -> Self {
        ProblemInput {
            config,
            expenses: Vec::new(),
            deposits: Vec::new(),
            shifts: None,
        }
    }

    /// Load a problem from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let input: ProblemInput = serde_json::from_str(text)?;
        input.validate()?;
        Ok(input)
    }

    pub fn validate(&self) -> Result<()> {
        self.config.validate()?;
        let amounts = self
            .expenses
            .iter()
            .map(|e| e.amount)
            .chain(self.deposits.iter().map(|d| d.amount));
        for amount in amounts {
            if !amount.is_finite() {
                return Err(PlannerError::InvalidConfig(
                    "expense and deposit amounts must be finite".to_string(),
                ));
            }
        }
        self.catalog().map(|_| ())
    }

    /// Shift catalog for this problem
    pub fn catalog(&self) -> Result<ShiftCatalog> {
        match &self.shifts {
            Some(types) => ShiftCatalog::new(types.clone()),
            None => Ok(ShiftCatalog::standard()),
        }
    }

    pub fn statistics(&self) -> InputStatistics {
        let total_expenses = self.expenses.iter().map(|e| e.amount).sum();
        let total_deposits = self.deposits.iter().map(|d| d.amount).sum();
        let locked_days = self
            .config
            .constraints_in_range()
            .filter(|(_, c)| c.is_locked())
            .count();

        InputStatistics {
            starting_balance: self.config.starting_balance,
            target_ending_balance: self.config.target_ending_balance,
            minimum_balance: self.config.minimum_balance,
            num_expenses: self.expenses.len(),
            total_expenses,
            num_deposits: self.deposits.len(),
            total_deposits,
            num_constraints: self.config.manual_constraints.len(),
            locked_days,
            reset_day: self.config.balance_reset.map(|r| r.day),
        }
    }
}

/// Summary of a problem, printed by the CLI in verbose mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputStatistics {
    pub starting_balance: f64,
    pub target_ending_balance: f64,
    pub minimum_balance: f64,
    pub num_expenses: usize,
    pub total_expenses: f64,
    pub num_deposits: usize,
    pub total_deposits: f64,
    pub num_constraints: usize,
    pub locked_days: usize,
    pub reset_day: Option<usize>,
}

impl std::fmt::Display for InputStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Problem:")?;
        writeln!(f, "  Starting balance: {:.2}", self.starting_balance)?;
        writeln!(f, "  Target ending balance: {:.2}", self.target_ending_balance)?;
        writeln!(f, "  Minimum balance: {:.2}", self.minimum_balance)?;
        writeln!(f, "  Expenses: {} (total {:.2})", self.num_expenses, self.total_expenses)?;
        writeln!(f, "  Deposits: {} (total {:.2})", self.num_deposits, self.total_deposits)?;
        writeln!(
            f,
            "  Manual constraints: {} ({} locked days)",
            self.num_constraints, self.locked_days
        )?;
        match self.reset_day {
            Some(day) => writeln!(f, "  Balance reset: day {}", day),
            None => writeln!(f, "  Balance reset: none"),
        }
    }
}
