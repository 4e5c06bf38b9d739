//! Chromosome representation and the operators that create and perturb it.
//!
//! A chromosome holds one gene per day: `None` for a day off, or the id
//! of the shift combination worked. Generation is biased toward covering
//! critical days and spacing work days out; mutation and crossover never
//! touch locked days.

use crate::config::DAYS_IN_MONTH;
use crate::constraints::{ResolvedConstraints, SearchMode};
use crate::shifts::{ComboId, ShiftCatalog, ShiftTier};
use rand::prelude::*;

/// One gene per day, `None` meaning day off
pub type Gene = Option<ComboId>;

/// A candidate month of shifts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Chromosome {
    genes: Vec<Gene>,
}

impl Chromosome {
    /// Every day off
    pub fn empty() -> Self {
        Chromosome {
            genes: vec![None; DAYS_IN_MONTH],
        }
    }

    pub fn from_genes(genes: Vec<Gene>) -> Self {
        debug_assert_eq!(genes.len(), DAYS_IN_MONTH);
        Chromosome { genes }
    }

    #[inline]
    pub fn get(&self, day: usize) -> Gene {
        self.genes[day - 1]
    }

    #[inline]
    pub fn set(&mut self, day: usize, gene: Gene) {
        self.genes[day - 1] = gene;
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Days with a shift assigned, ascending
    pub fn work_days(&self) -> Vec<usize> {
        (1..=DAYS_IN_MONTH).filter(|&d| self.get(d).is_some()).collect()
    }

    pub fn work_day_count(&self) -> usize {
        self.genes.iter().filter(|g| g.is_some()).count()
    }

    /// Whether the day before or after `day` is worked
    pub fn has_adjacent_work(&self, day: usize) -> bool {
        (day > 1 && self.get(day - 1).is_some()) || (day < DAYS_IN_MONTH && self.get(day + 1).is_some())
    }

    /// Shift labels per day, for reporting
    pub fn to_labels(&self, catalog: &ShiftCatalog) -> Vec<Option<String>> {
        self.genes
            .iter()
            .map(|g| g.map(|id| catalog.combination(id).label.clone()))
            .collect()
    }
}

impl Default for Chromosome {
    fn default() -> Self {
        Self::empty()
    }
}

/// Generator, mutator and crossover bound to one resolved problem
pub struct ChromosomeOperators<'a> {
    resolved: &'a ResolvedConstraints,
    catalog: &'a ShiftCatalog,
    mutation_rate: f64,
}

impl<'a> ChromosomeOperators<'a> {
    pub fn new(resolved: &'a ResolvedConstraints, catalog: &'a ShiftCatalog, mutation_rate: f64) -> Self {
        ChromosomeOperators {
            resolved,
            catalog,
            mutation_rate,
        }
    }

    fn mode(&self) -> SearchMode {
        self.resolved.mode
    }

    /// Write every manually fixed shift into the chromosome
    pub fn stamp_locked(&self, chromosome: &mut Chromosome) {
        for day in 1..=DAYS_IN_MONTH {
            if let Some(locked) = self.resolved.locked_day(day) {
                chromosome.set(day, locked.combo);
            } else if day < self.resolved.effective_start_day {
                chromosome.set(day, None);
            }
        }
    }

    /// Work days the generator aims for
    pub fn target_work_days(&self) -> usize {
        let required = self.resolved.required_earnings;
        match self.mode() {
            SearchMode::Crisis => {
                let ninety_percent = (self.resolved.available_days as f64 * 0.9).ceil() as usize;
                let by_doubles = (required / self.catalog.average_double_net()).ceil() as usize;
                ninety_percent.max(by_doubles)
            }
            SearchMode::Normal => (required / self.catalog.large_net()).ceil() as usize,
        }
    }

    /// Build a fresh chromosome
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Chromosome {
        let mut chromosome = Chromosome::empty();
        self.stamp_locked(&mut chromosome);

        let first_day = self.resolved.effective_start_day;

        // cover each critical day from a few days ahead
        for &critical in &self.resolved.critical_days {
            let offset = rng.gen_range(2..=5);
            let day = critical.saturating_sub(offset).max(first_day);
            if self.resolved.is_mutable(day) && chromosome.get(day).is_none() {
                let combo = self.draw_fill(rng);
                chromosome.set(day, Some(combo));
            }
        }

        let target = self.target_work_days();
        let mut worked = self
            .resolved
            .window()
            .filter(|&d| chromosome.get(d).is_some())
            .count();

        let mut free: Vec<usize> = self
            .resolved
            .mutable_days()
            .into_iter()
            .filter(|&d| chromosome.get(d).is_none())
            .collect();
        free.shuffle(rng);

        // first pass keeps a day of rest between shifts
        for &day in &free {
            if worked >= target {
                break;
            }
            if chromosome.get(day).is_none() && !chromosome.has_adjacent_work(day) {
                let combo = self.draw_fill(rng);
                chromosome.set(day, Some(combo));
                worked += 1;
            }
        }

        for &day in &free {
            if worked >= target {
                break;
            }
            if chromosome.get(day).is_none() {
                let combo = self.draw_fill(rng);
                chromosome.set(day, Some(combo));
                worked += 1;
            }
        }

        chromosome
    }

    /// Resample each mutable day with probability `mutation_rate`
    pub fn mutate<R: Rng + ?Sized>(&self, chromosome: &mut Chromosome, rng: &mut R) {
        for day in self.resolved.window() {
            if !self.resolved.is_mutable(day) || rng.gen::<f64>() >= self.mutation_rate {
                continue;
            }
            let gene = match self.mode() {
                SearchMode::Crisis => Some(self.draw_crisis_mutation(rng)),
                SearchMode::Normal => self.resample_normal(chromosome, day, rng),
            };
            chromosome.set(day, gene);
        }
    }

    /// Two-point crossover: the child takes `b` between the cut points and `a` elsewhere
    pub fn crossover<R: Rng + ?Sized>(&self, a: &Chromosome, b: &Chromosome, rng: &mut R) -> Chromosome {
        let i = rng.gen_range(1..=DAYS_IN_MONTH);
        let j = rng.gen_range(1..=DAYS_IN_MONTH);
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };

        let mut child = a.clone();
        for day in lo..=hi {
            child.set(day, b.get(day));
        }
        self.stamp_locked(&mut child);
        child
    }

    fn resample_normal<R: Rng + ?Sized>(&self, chromosome: &Chromosome, day: usize, rng: &mut R) -> Gene {
        let current = chromosome.get(day);
        let adjacent = chromosome.has_adjacent_work(day);
        // a well-spaced shift or a rest day next to a shift is usually worth keeping
        let worth_keeping = match current {
            Some(_) => !adjacent,
            None => adjacent,
        };
        if worth_keeping && rng.gen_bool(0.8) {
            return current;
        }
        self.draw_normal_free(rng)
    }

    /// Shift for a newly placed work day during generation
    fn draw_fill<R: Rng + ?Sized>(&self, rng: &mut R) -> ComboId {
        match self.mode() {
            SearchMode::Crisis => {
                let r = rng.gen::<f64>();
                if r < 0.7 {
                    self.catalog.double(ShiftTier::Large, ShiftTier::Large)
                } else if r < 0.9 {
                    self.catalog.double(ShiftTier::Medium, ShiftTier::Large)
                } else {
                    self.catalog.single(ShiftTier::Large)
                }
            }
            SearchMode::Normal => self.draw_single(rng),
        }
    }

    /// 60% large, 20% medium, 20% small
    fn draw_single<R: Rng + ?Sized>(&self, rng: &mut R) -> ComboId {
        let r = rng.gen::<f64>();
        let tier = if r < 0.6 {
            ShiftTier::Large
        } else if r < 0.8 {
            ShiftTier::Medium
        } else {
            ShiftTier::Small
        };
        self.catalog.single(tier)
    }

    fn draw_crisis_mutation<R: Rng + ?Sized>(&self, rng: &mut R) -> ComboId {
        let r = rng.gen::<f64>();
        if r < 0.5 {
            self.catalog.double(ShiftTier::Large, ShiftTier::Large)
        } else if r < 0.8 {
            self.catalog.double(ShiftTier::Medium, ShiftTier::Large)
        } else {
            self.catalog.double(ShiftTier::Medium, ShiftTier::Medium)
        }
    }

    /// Any assignment, day off included
    fn draw_normal_free<R: Rng + ?Sized>(&self, rng: &mut R) -> Gene {
        let r = rng.gen::<f64>();
        if r < 0.4 {
            None
        } else if r < 0.85 {
            Some(self.draw_single(rng))
        } else {
            let doubles = self.catalog.doubles();
            Some(rng.gen_range(doubles))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BalanceReset, Expense, ManualConstraint, OptimizationConfig};
    use crate::constraints::ConstraintResolver;
    use rand_chacha::ChaCha8Rng;

    fn resolve(config: &OptimizationConfig, expenses: &[Expense]) -> ResolvedConstraints {
        ConstraintResolver::resolve(config, expenses, &[], &ShiftCatalog::standard(), 200.0).unwrap()
    }

    #[test]
    fn test_nothing_required_gives_empty_chromosome() {
        let config = OptimizationConfig::new(1000.0, 1000.0, 0.0);
        let resolved = resolve(&config, &[]);
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 0.15);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..20 {
            assert_eq!(ops.generate(&mut rng), Chromosome::empty());
        }
    }

    #[test]
    fn test_normal_generation_meets_target() {
        let config = OptimizationConfig::new(500.0, 1500.0, 0.0);
        let resolved = resolve(&config, &[]);
        assert!(resolved.critical_days.is_empty());
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 0.15);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        // ceil(1000 / 86.5) = 12
        assert_eq!(ops.target_work_days(), 12);
        let chromosome = ops.generate(&mut rng);
        assert_eq!(chromosome.work_day_count(), 12);
        for day in chromosome.work_days() {
            assert!(!catalog.combination(chromosome.get(day).unwrap()).is_double());
        }
    }

    #[test]
    fn test_crisis_generation_prefers_doubles() {
        let config = OptimizationConfig::new(0.0, 5000.0, 0.0);
        let resolved = resolve(&config, &[]);
        assert_eq!(resolved.mode, SearchMode::Crisis);
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 0.15);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let chromosome = ops.generate(&mut rng);
        assert!(chromosome.work_day_count() >= 27);
        let doubles = chromosome
            .work_days()
            .into_iter()
            .filter(|&d| catalog.combination(chromosome.get(d).unwrap()).is_double())
            .count();
        assert!(doubles > chromosome.work_day_count() / 2);
    }

    #[test]
    fn test_critical_days_get_covered_ahead() {
        let config = OptimizationConfig::new(300.0, 300.0, 0.0);
        let expenses = vec![Expense::new(20, 250.0, "bill")];
        let resolved = resolve(&config, &expenses);
        assert_eq!(resolved.critical_days.first(), Some(&20));
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 0.15);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..10 {
            let chromosome = ops.generate(&mut rng);
            assert!((15..=18).any(|d| chromosome.get(d).is_some()));
        }
    }

    #[test]
    fn test_operators_never_touch_locked_days() {
        let mut config = OptimizationConfig::new(0.0, 2500.0, 0.0);
        config.manual_constraints.insert(3, ManualConstraint::shift("small"));
        config.manual_constraints.insert(8, ManualConstraint::balance(100.0));
        config.manual_constraints.insert(12, ManualConstraint::earnings(40.0));
        let resolved = resolve(&config, &[]);
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(9);

        let small = catalog.single(ShiftTier::Small);
        let mut a = ops.generate(&mut rng);
        let b = ops.generate(&mut rng);

        // parents that disagree on a locked day must not leak it into the child
        a.set(3, None);
        let mut b_tampered = b.clone();
        b_tampered.set(8, Some(small));

        for _ in 0..50 {
            let mut child = ops.crossover(&a, &b_tampered, &mut rng);
            ops.mutate(&mut child, &mut rng);
            assert_eq!(child.get(3), Some(small));
            assert_eq!(child.get(8), None);
            assert_eq!(child.get(12), None);
        }
    }

    #[test]
    fn test_days_before_reset_stay_off() {
        let mut config = OptimizationConfig::new(0.0, 1500.0, 0.0);
        config.balance_reset = Some(BalanceReset { day: 12, new_balance: 0.0 });
        let resolved = resolve(&config, &[]);
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(21);

        let a = ops.generate(&mut rng);
        let b = ops.generate(&mut rng);
        let mut child = ops.crossover(&a, &b, &mut rng);
        ops.mutate(&mut child, &mut rng);
        for chromosome in [&a, &b, &child] {
            assert!((1..=12).all(|d| chromosome.get(d).is_none()));
        }
    }

    #[test]
    fn test_crossover_takes_segment_from_second_parent() {
        let config = OptimizationConfig::new(0.0, 0.0, 0.0);
        let resolved = resolve(&config, &[]);
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let a = Chromosome::empty();
        let b = Chromosome::from_genes(vec![Some(2); DAYS_IN_MONTH]);
        let child = ops.crossover(&a, &b, &mut rng);

        let worked = child.work_days();
        assert!(!worked.is_empty());
        // the inherited block is contiguous
        assert_eq!(worked.last().unwrap() - worked.first().unwrap() + 1, worked.len());
    }

    #[test]
    fn test_zero_mutation_rate_is_identity() {
        let config = OptimizationConfig::new(0.0, 1000.0, 0.0);
        let resolved = resolve(&config, &[]);
        let catalog = ShiftCatalog::standard();
        let ops = ChromosomeOperators::new(&resolved, &catalog, 0.0);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let original = ops.generate(&mut rng);
        let mut mutated = original.clone();
        ops.mutate(&mut mutated, &mut rng);
        assert_eq!(original, mutated);
    }
}
