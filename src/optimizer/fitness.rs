//! Month simulation and the two cost strategies.
//!
//! [`FitnessEvaluator::simulate`] walks days 1..=30 once and records every
//! balance movement; the same trace feeds both the scalar fitness and the
//! ledger handed back to the caller, so the two can never disagree.
//! Lower fitness is better.

use crate::config::DAYS_IN_MONTH;
use crate::constraints::{ResolvedConstraints, SearchMode};
use crate::optimizer::chromosome::Chromosome;
use crate::shifts::{ComboId, ShiftCatalog};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// What happened to the balance on one simulated day
#[derive(Debug, Clone, PartialEq)]
pub struct DayTrace {
    pub day: usize,
    pub combo: Option<ComboId>,
    pub earnings: f64,
    pub expenses: f64,
    pub deposit: f64,
    pub start_balance: f64,
    pub end_balance: f64,
    /// Correction applied by a reset or fixed-balance anchor
    pub adjustment: f64,
    pub anchored: bool,
}

impl DayTrace {
    pub fn is_work_day(&self) -> bool {
        self.combo.is_some() || self.earnings > 0.0
    }
}

/// Full day-by-day simulation of one chromosome
#[derive(Debug, Clone)]
pub struct Simulation {
    pub days: Vec<DayTrace>,
    pub ending_balance: f64,
    pub violation_count: usize,
    pub min_balance_seen: f64,
    pub total_earnings: f64,
    /// Earnings from the effective start day on
    pub window_earnings: f64,
    /// Sum of |computed - fixed| over fixed-balance days
    pub fixed_balance_deviation: f64,
}

impl Simulation {
    pub fn work_day_list(&self) -> Vec<usize> {
        self.days
            .iter()
            .filter(|d| d.is_work_day())
            .map(|d| d.day)
            .collect()
    }
}

/// Scored view of a chromosome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FitnessBreakdown {
    pub scalar_fitness: f64,
    pub ending_balance: f64,
    pub work_day_count: usize,
    pub violation_count: usize,
    pub total_earnings: f64,
    pub min_balance_seen: f64,
    pub work_day_list: Vec<usize>,
}

/// Everything a strategy needs to put a price on a simulated month
#[derive(Debug, Clone)]
pub struct FitnessContext<'a> {
    pub ending_balance: f64,
    pub target_ending_balance: f64,
    pub minimum_balance: f64,
    pub work_days: &'a [usize],
    /// Work days at or after the effective start day
    pub window_work_days: usize,
    pub violation_count: usize,
    pub total_earnings: f64,
    pub window_earnings: f64,
    pub min_balance_seen: f64,
    pub required_earnings: f64,
    pub available_days: usize,
    pub best_day_net: f64,
    pub fixed_balance_deviation: f64,
    pub mode: SearchMode,
    pub effective_start_day: usize,
    pub reset_day: Option<usize>,
}

impl FitnessContext<'_> {
    fn min_balance_shortfall(&self) -> f64 {
        (self.minimum_balance - self.min_balance_seen).max(0.0) * 10.0
    }
}

/// Scalar cost of a simulated month
pub trait FitnessStrategy: Sync {
    fn cost(&self, ctx: &FitnessContext) -> f64;
    fn name(&self) -> &str;
}

/// Balanced search: hit the target without working more than necessary
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalStrategy;

impl NormalStrategy {
    pub const VIOLATION_WEIGHT: f64 = 5000.0;
    pub const BALANCE_WEIGHT: f64 = 100.0;
    pub const WORK_DAY_WEIGHT: f64 = 30.0;
    pub const CONSECUTIVE_WEIGHT: f64 = 75.0;
    pub const SPACING_WEIGHT: f64 = 50.0;
    pub const FIXED_BALANCE_WEIGHT: f64 = 10000.0;

    /// Overshoot costs more than undershoot so the search does not add shifts for nothing
    fn balance_penalty(ctx: &FitnessContext) -> f64 {
        let diff = ctx.ending_balance - ctx.target_ending_balance;
        let base = diff.abs() * Self::BALANCE_WEIGHT;
        if diff > 0.0 {
            let overshoot_ratio = diff / ctx.target_ending_balance.abs().max(1.0);
            base * (1.0 + 2.0 * overshoot_ratio)
        } else {
            base
        }
    }
}

impl FitnessStrategy for NormalStrategy {
    fn cost(&self, ctx: &FitnessContext) -> f64 {
        let gaps = work_day_gaps(ctx.work_days);
        let consecutive = gaps.iter().filter(|&&g| g == 1.0).count();

        ctx.violation_count as f64 * Self::VIOLATION_WEIGHT
            + Self::balance_penalty(ctx)
            + ctx.work_days.len() as f64 * Self::WORK_DAY_WEIGHT
            + consecutive as f64 * Self::CONSECUTIVE_WEIGHT
            + gap_variance(&gaps).sqrt() * Self::SPACING_WEIGHT
            + ctx.min_balance_shortfall()
            + ctx.fixed_balance_deviation * Self::FIXED_BALANCE_WEIGHT
    }

    fn name(&self) -> &str {
        "Normal"
    }
}

/// Feasibility first: reaching the target dominates everything else
#[derive(Debug, Default, Clone, Copy)]
pub struct CrisisStrategy;

impl CrisisStrategy {
    pub const VIOLATION_WEIGHT: f64 = 10000.0;
    pub const BELOW_TARGET_WEIGHT: f64 = 1000.0;
    pub const ABOVE_TARGET_WEIGHT: f64 = 500.0;
    pub const EARNINGS_SHORTFALL_WEIGHT: f64 = 100.0;
    pub const WORK_DAY_DEFICIT_WEIGHT: f64 = 1000.0;
    pub const FIXED_BALANCE_WEIGHT: f64 = 0.01;

    fn min_work_days_needed(ctx: &FitnessContext) -> usize {
        if ctx.best_day_net <= 0.0 {
            return ctx.available_days;
        }
        ((ctx.required_earnings / ctx.best_day_net).ceil() as usize).min(ctx.available_days)
    }
}

impl FitnessStrategy for CrisisStrategy {
    fn cost(&self, ctx: &FitnessContext) -> f64 {
        let diff = ctx.ending_balance - ctx.target_ending_balance;
        let below = if diff < 0.0 { -diff * Self::BELOW_TARGET_WEIGHT } else { 0.0 };
        let above = if diff > 0.0 { diff * Self::ABOVE_TARGET_WEIGHT } else { 0.0 };
        let earnings_shortfall = (ctx.required_earnings - ctx.window_earnings).max(0.0);
        let deficit = Self::min_work_days_needed(ctx).saturating_sub(ctx.window_work_days);

        ctx.violation_count as f64 * Self::VIOLATION_WEIGHT
            + below
            + above
            + earnings_shortfall * Self::EARNINGS_SHORTFALL_WEIGHT
            + deficit as f64 * Self::WORK_DAY_DEFICIT_WEIGHT
            + ctx.min_balance_shortfall() * 2.0
            + ctx.fixed_balance_deviation * Self::FIXED_BALANCE_WEIGHT
    }

    fn name(&self) -> &str {
        "Crisis"
    }
}

/// The strategy a mode is scored with
pub fn strategy_for(mode: SearchMode) -> &'static dyn FitnessStrategy {
    static NORMAL: NormalStrategy = NormalStrategy;
    static CRISIS: CrisisStrategy = CrisisStrategy;
    match mode {
        SearchMode::Normal => &NORMAL,
        SearchMode::Crisis => &CRISIS,
    }
}

fn work_day_gaps(work_days: &[usize]) -> Vec<f64> {
    work_days
        .windows(2)
        .map(|pair| (pair[1] - pair[0]) as f64)
        .collect()
}

/// Population variance, zero for fewer than two gaps
fn gap_variance(gaps: &[f64]) -> f64 {
    if gaps.len() < 2 {
        return 0.0;
    }
    gaps.iter().population_variance()
}

/// Simulates and scores chromosomes for one resolved problem
pub struct FitnessEvaluator<'a> {
    resolved: &'a ResolvedConstraints,
    catalog: &'a ShiftCatalog,
}

impl<'a> FitnessEvaluator<'a> {
    pub fn new(resolved: &'a ResolvedConstraints, catalog: &'a ShiftCatalog) -> Self {
        FitnessEvaluator { resolved, catalog }
    }

    /// Run the month day by day
    pub fn simulate(&self, chromosome: &Chromosome) -> Simulation {
        let r = self.resolved;
        let mut balance = r.starting_balance;
        let mut days = Vec::with_capacity(DAYS_IN_MONTH);
        let mut violation_count = 0;
        let mut min_balance_seen = f64::INFINITY;
        let mut total_earnings = 0.0;
        let mut window_earnings = 0.0;
        let mut fixed_balance_deviation = 0.0;

        for day in 1..=DAYS_IN_MONTH {
            let start_balance = balance;
            let deposit = r.deposit(day);
            let expenses = r.expense(day);
            let locked = r.locked_day(day);

            let (combo, earnings) = match locked {
                Some(locked) => (locked.combo, locked.earnings(self.catalog)),
                None if day >= r.effective_start_day => {
                    let combo = chromosome.get(day);
                    (combo, combo.map_or(0.0, |id| self.catalog.net_pay(id)))
                }
                None => (None, 0.0),
            };

            let natural = start_balance + deposit + earnings - expenses;
            let mut end_balance = natural;
            let mut anchored = false;

            if let Some(reset) = r.balance_reset.filter(|reset| reset.day == day) {
                end_balance = reset.new_balance;
                anchored = true;
            } else if let Some(fixed) = locked.and_then(|l| l.fixed_balance) {
                fixed_balance_deviation += (natural - fixed).abs();
                end_balance = fixed;
                anchored = true;
            }

            if end_balance < r.minimum_balance {
                violation_count += 1;
            }
            min_balance_seen = min_balance_seen.min(end_balance);
            total_earnings += earnings;
            if day >= r.effective_start_day {
                window_earnings += earnings;
            }

            days.push(DayTrace {
                day,
                combo,
                earnings,
                expenses,
                deposit,
                start_balance,
                end_balance,
                adjustment: if anchored { end_balance - natural } else { 0.0 },
                anchored,
            });
            balance = end_balance;
        }

        Simulation {
            days,
            ending_balance: balance,
            violation_count,
            min_balance_seen,
            total_earnings,
            window_earnings,
            fixed_balance_deviation,
        }
    }

    /// Simulate and score a chromosome
    pub fn evaluate(&self, chromosome: &Chromosome) -> FitnessBreakdown {
        let simulation = self.simulate(chromosome);
        self.score(&simulation)
    }

    pub fn score(&self, simulation: &Simulation) -> FitnessBreakdown {
        let r = self.resolved;
        let work_day_list = simulation.work_day_list();
        let window_work_days = work_day_list
            .iter()
            .filter(|&&d| d >= r.effective_start_day)
            .count();

        let ctx = FitnessContext {
            ending_balance: simulation.ending_balance,
            target_ending_balance: r.target_ending_balance,
            minimum_balance: r.minimum_balance,
            work_days: &work_day_list,
            window_work_days,
            violation_count: simulation.violation_count,
            total_earnings: simulation.total_earnings,
            window_earnings: simulation.window_earnings,
            min_balance_seen: simulation.min_balance_seen,
            required_earnings: r.required_earnings,
            available_days: r.available_days,
            best_day_net: self.catalog.best_day_net(),
            fixed_balance_deviation: simulation.fixed_balance_deviation,
            mode: r.mode,
            effective_start_day: r.effective_start_day,
            reset_day: r.balance_reset.map(|reset| reset.day),
        };

        let scalar_fitness = strategy_for(ctx.mode).cost(&ctx);

        FitnessBreakdown {
            scalar_fitness,
            ending_balance: simulation.ending_balance,
            work_day_count: work_day_list.len(),
            violation_count: simulation.violation_count,
            total_earnings: simulation.total_earnings,
            min_balance_seen: simulation.min_balance_seen,
            work_day_list,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BalanceReset, Expense, ManualConstraint, OptimizationConfig};
    use crate::constraints::ConstraintResolver;
    use crate::shifts::ShiftTier;

    fn resolve(config: &OptimizationConfig, expenses: &[Expense]) -> ResolvedConstraints {
        ConstraintResolver::resolve(config, expenses, &[], &ShiftCatalog::standard(), 200.0).unwrap()
    }

    fn context<'a>(work_days: &'a [usize], ending_balance: f64, target: f64) -> FitnessContext<'a> {
        FitnessContext {
            ending_balance,
            target_ending_balance: target,
            minimum_balance: 0.0,
            work_days,
            window_work_days: work_days.len(),
            violation_count: 0,
            total_earnings: 0.0,
            window_earnings: 0.0,
            min_balance_seen: 0.0,
            required_earnings: 0.0,
            available_days: 30,
            best_day_net: 173.0,
            fixed_balance_deviation: 0.0,
            mode: SearchMode::Normal,
            effective_start_day: 1,
            reset_day: None,
        }
    }

    #[test]
    fn test_empty_month_on_target_costs_nothing() {
        let config = OptimizationConfig::new(1000.0, 1000.0, 0.0);
        let resolved = resolve(&config, &[]);
        let catalog = ShiftCatalog::standard();
        let evaluator = FitnessEvaluator::new(&resolved, &catalog);

        let fitness = evaluator.evaluate(&Chromosome::empty());
        assert_eq!(fitness.scalar_fitness, 0.0);
        assert_eq!(fitness.ending_balance, 1000.0);
        assert_eq!(fitness.work_day_count, 0);
        assert_eq!(fitness.min_balance_seen, 1000.0);
    }

    #[test]
    fn test_simulation_keeps_balance_chain() {
        let mut config = OptimizationConfig::new(300.0, 500.0, 0.0);
        config.balance_reset = Some(BalanceReset { day: 5, new_balance: 50.0 });
        config.manual_constraints.insert(9, ManualConstraint::balance(400.0));
        let expenses = vec![Expense::new(2, 120.0, "bill"), Expense::new(7, 30.0, "bill")];
        let resolved = resolve(&config, &expenses);
        let catalog = ShiftCatalog::standard();
        let evaluator = FitnessEvaluator::new(&resolved, &catalog);

        let mut chromosome = Chromosome::empty();
        chromosome.set(7, Some(catalog.single(ShiftTier::Large)));
        chromosome.set(12, Some(catalog.double(ShiftTier::Small, ShiftTier::Large)));
        let sim = evaluator.simulate(&chromosome);

        assert_eq!(sim.days.len(), DAYS_IN_MONTH);
        for (i, day) in sim.days.iter().enumerate() {
            assert_eq!(day.day, i + 1);
            let expected = day.start_balance + day.deposit + day.earnings - day.expenses + day.adjustment;
            assert!((day.end_balance - expected).abs() < 1e-9);
            if i > 0 {
                assert_eq!(day.start_balance, sim.days[i - 1].end_balance);
            }
        }
        assert_eq!(sim.days[4].end_balance, 50.0);
        assert!(sim.days[4].anchored);
        assert_eq!(sim.days[8].end_balance, 400.0);
        // day 9 computes 50 - 30 + 86.5 = 106.5 before the anchor
        assert!((sim.fixed_balance_deviation - 293.5).abs() < 1e-9);
        assert!((sim.ending_balance - (400.0 + 142.5)).abs() < 1e-9);
    }

    #[test]
    fn test_violations_counted_per_day() {
        let config = OptimizationConfig::new(100.0, 100.0, 50.0);
        let expenses = vec![Expense::new(28, 80.0, "bill")];
        let resolved = resolve(&config, &expenses);
        let catalog = ShiftCatalog::standard();
        let evaluator = FitnessEvaluator::new(&resolved, &catalog);

        let fitness = evaluator.evaluate(&Chromosome::empty());
        assert_eq!(fitness.violation_count, 3);
        assert_eq!(fitness.min_balance_seen, 20.0);
    }

    #[test]
    fn test_normal_penalizes_overshoot_harder() {
        let strategy = NormalStrategy;
        let under = strategy.cost(&context(&[], 900.0, 1000.0));
        let over = strategy.cost(&context(&[], 1100.0, 1000.0));
        assert_eq!(under, 10000.0);
        assert!((over - 10000.0 * 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_crisis_penalizes_undershoot_harder() {
        let strategy = CrisisStrategy;
        let mut under_ctx = context(&[], 900.0, 1000.0);
        under_ctx.mode = SearchMode::Crisis;
        let mut over_ctx = context(&[], 1100.0, 1000.0);
        over_ctx.mode = SearchMode::Crisis;
        assert_eq!(strategy.cost(&under_ctx), 100000.0);
        assert_eq!(strategy.cost(&over_ctx), 50000.0);
    }

    #[test]
    fn test_normal_spacing_terms() {
        let strategy = NormalStrategy;
        let spread = strategy.cost(&context(&[1, 3, 5, 7], 1000.0, 1000.0));
        let packed = strategy.cost(&context(&[1, 2, 3, 4], 1000.0, 1000.0));
        // equal gaps: only the work-day term
        assert_eq!(spread, 4.0 * 30.0);
        assert_eq!(packed, 4.0 * 30.0 + 3.0 * 75.0);

        let uneven = strategy.cost(&context(&[1, 3, 9], 1000.0, 1000.0));
        // gaps 2 and 6: variance 4, sqrt 2
        assert!((uneven - (3.0 * 30.0 + 2.0 * 50.0)).abs() < 1e-9);
    }

    #[test]
    fn test_strategy_follows_mode() {
        assert_eq!(strategy_for(SearchMode::Normal).name(), "Normal");
        assert_eq!(strategy_for(SearchMode::Crisis).name(), "Crisis");

        let crisis = resolve(&OptimizationConfig::new(0.0, 5000.0, 0.0), &[]);
        let normal = resolve(&OptimizationConfig::new(0.0, 2000.0, 0.0), &[]);
        assert_eq!(crisis.mode, SearchMode::Crisis);
        assert_eq!(normal.mode, SearchMode::Normal);
    }

    #[test]
    fn test_fixed_balance_multiplier_depends_on_mode() {
        let mut ctx = context(&[], 1000.0, 1000.0);
        ctx.fixed_balance_deviation = 10.0;
        assert_eq!(NormalStrategy.cost(&ctx), 100000.0);
        ctx.mode = SearchMode::Crisis;
        assert!((CrisisStrategy.cost(&ctx) - 0.1).abs() < 1e-9);
    }
}
