//! Evolution loop.
//!
//! One engine owns one problem, one population and one seeded RNG stream,
//! so independent runs can execute on separate threads without sharing
//! anything. Per generation the population is sorted (lower fitness is
//! better), progress is reported, the run control is consulted, the
//! stagnation counter is updated and the next population is bred from the
//! elites plus tournament-selected offspring.

use crate::config::{OptimizationConfig, ProblemInput};
use crate::constraints::{ConstraintResolver, ResolvedConstraints};
use crate::control::{ProgressEvent, ProgressObserver, RunControl, Signal, SilentObserver};
use crate::error::Result;
use crate::optimizer::chromosome::{Chromosome, ChromosomeOperators};
use crate::optimizer::fitness::{FitnessBreakdown, FitnessEvaluator};
use crate::schedule::{build_ledger, format_duration, OptimizationResult, Termination};
use crate::shifts::ShiftCatalog;
use log::{debug, info};
use ordered_float::OrderedFloat;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::Instant;

/// A chromosome and its score
#[derive(Debug, Clone)]
pub struct Individual {
    pub chromosome: Chromosome,
    pub fitness: FitnessBreakdown,
}

impl Individual {
    #[inline]
    pub fn cost(&self) -> f64 {
        self.fitness.scalar_fitness
    }
}

/// Genetic search over one month of shifts
pub struct EvolutionEngine {
    config: OptimizationConfig,
    catalog: ShiftCatalog,
    resolved: ResolvedConstraints,
    population: Vec<Individual>,
    rng: ChaCha8Rng,
    generation: usize,
    best_ever: f64,
    stagnation: usize,
    best_fitness_history: Vec<f64>,
    control: Arc<RunControl>,
}

impl EvolutionEngine {
    /// Validate the problem and resolve its constraints
    pub fn new(input: &ProblemInput) -> Result<Self> {
        input.validate()?;
        let catalog = input.catalog()?;
        let config = input.config.clone();
        let resolved = ConstraintResolver::resolve(
            &config,
            &input.expenses,
            &input.deposits,
            &catalog,
            config.params.buffer_margin,
        )?;
        let rng = ChaCha8Rng::seed_from_u64(config.params.seed);

        Ok(EvolutionEngine {
            config,
            catalog,
            resolved,
            population: Vec::new(),
            rng,
            generation: 0,
            best_ever: f64::INFINITY,
            stagnation: 0,
            best_fitness_history: Vec::new(),
            control: Arc::new(RunControl::new()),
        })
    }

    /// Share a run control with the caller
    pub fn with_control(mut self, control: Arc<RunControl>) -> Self {
        self.control = control;
        self
    }

    pub fn control(&self) -> Arc<RunControl> {
        Arc::clone(&self.control)
    }

    pub fn resolved(&self) -> &ResolvedConstraints {
        &self.resolved
    }

    pub fn catalog(&self) -> &ShiftCatalog {
        &self.catalog
    }

    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn current_generation(&self) -> usize {
        self.generation
    }

    pub fn best_fitness_history(&self) -> &[f64] {
        &self.best_fitness_history
    }

    pub fn best(&self) -> Option<&Individual> {
        self.population
            .iter()
            .min_by_key(|ind| OrderedFloat(ind.cost()))
    }

    fn evaluator(&self) -> FitnessEvaluator<'_> {
        FitnessEvaluator::new(&self.resolved, &self.catalog)
    }

    /// Fresh population from the biased generator
    fn initialize_population(&mut self) {
        self.rng = ChaCha8Rng::seed_from_u64(self.config.params.seed);
        self.generation = 0;
        self.best_ever = f64::INFINITY;
        self.stagnation = 0;
        self.best_fitness_history.clear();

        let ops = ChromosomeOperators::new(&self.resolved, &self.catalog, self.config.params.mutation_rate);
        let evaluator = FitnessEvaluator::new(&self.resolved, &self.catalog);
        let mut population = Vec::with_capacity(self.config.population_size);
        for _ in 0..self.config.population_size {
            let chromosome = ops.generate(&mut self.rng);
            let fitness = evaluator.evaluate(&chromosome);
            population.push(Individual { chromosome, fitness });
        }
        self.population = population;
    }

    fn sort_population(&mut self) {
        self.population.sort_by_key(|ind| OrderedFloat(ind.cost()));
    }

    fn emit_progress(&self, observer: &mut dyn ProgressObserver) {
        let best = &self.population[0];
        let event = ProgressEvent {
            generation: self.generation,
            progress_percent: self.generation as f64 / self.config.generations as f64 * 100.0,
            best_fitness: best.cost(),
            work_days: best.fitness.work_day_count,
            balance: best.fitness.ending_balance,
            violations: best.fitness.violation_count,
        };
        debug!(
            "Gen {}  best {:.2}  balance {:.2}  work days {}  violations {}",
            event.generation, event.best_fitness, event.balance, event.work_days, event.violations
        );
        observer.on_progress(&event);
    }

    /// Reset the counter on a significant improvement, count up otherwise
    fn track_stagnation(&mut self) {
        let best = self.population[0].cost();
        let threshold = self.config.params.improvement_threshold;
        let improved = !self.best_ever.is_finite() || best < self.best_ever * (1.0 - threshold);
        if improved {
            self.stagnation = 0;
        } else {
            self.stagnation += 1;
        }
        self.best_ever = self.best_ever.min(best);
    }

    fn has_converged(&self) -> bool {
        let p = &self.config.params;
        let best = &self.population[0].fitness;
        self.generation > p.min_generations_before_stop
            && self.stagnation > p.stagnation_limit
            && best.violation_count == 0
            && (best.ending_balance - self.config.target_ending_balance).abs() <= p.target_tolerance
    }

    /// Build the next population: elites first, then offspring
    fn evolve(&mut self) {
        let size = self.config.population_size;
        let elite = self.config.elite_size();
        let tournament_size = self.config.params.tournament_size;

        let mut next: Vec<Individual> = self.population.iter().take(elite).cloned().collect();

        let ops = ChromosomeOperators::new(&self.resolved, &self.catalog, self.config.params.mutation_rate);
        let evaluator = FitnessEvaluator::new(&self.resolved, &self.catalog);
        while next.len() < size {
            let a = tournament_select(&self.population, tournament_size, &mut self.rng);
            let b = tournament_select(&self.population, tournament_size, &mut self.rng);

            let mut chromosome = ops.crossover(
                &self.population[a].chromosome,
                &self.population[b].chromosome,
                &mut self.rng,
            );
            ops.mutate(&mut chromosome, &mut self.rng);
            let fitness = evaluator.evaluate(&chromosome);
            next.push(Individual { chromosome, fitness });
        }

        self.population = next;
    }

    /// Run the search to completion, convergence or cancellation
    pub fn run(&mut self, observer: &mut dyn ProgressObserver) -> Result<OptimizationResult> {
        let start = Instant::now();
        let generations = self.config.generations;
        let interval = self.config.params.progress_interval;

        info!(
            "Optimizing in {} mode: required earnings {:.2} over {} available days, {} critical",
            self.resolved.mode,
            self.resolved.required_earnings,
            self.resolved.available_days,
            self.resolved.critical_days.len()
        );

        self.initialize_population();
        let mut termination = Termination::Completed;

        while self.generation < generations {
            self.sort_population();
            self.best_fitness_history.push(self.population[0].cost());

            if interval > 0 && self.generation % interval == 0 {
                self.emit_progress(observer);
            }

            if self.control.checkpoint() == Signal::Cancel {
                termination = Termination::Cancelled;
                break;
            }

            self.track_stagnation();
            if self.has_converged() {
                termination = Termination::Converged;
                break;
            }

            self.evolve();
            self.generation += 1;
        }

        self.sort_population();
        let result = self.build_result(termination, format_duration(start.elapsed()));
        info!(
            "Run {} after {} generations: fitness {:.2}, final balance {:.2}, {} work days, {} violations ({})",
            result.termination,
            result.generations_run,
            result.fitness,
            result.final_balance,
            result.work_days.len(),
            result.violations,
            result.computation_time
        );
        Ok(result)
    }

    /// Run without progress reporting
    pub fn run_silent(&mut self) -> Result<OptimizationResult> {
        self.run(&mut SilentObserver)
    }

    fn build_result(&self, termination: Termination, computation_time: String) -> OptimizationResult {
        let best = &self.population[0];
        let simulation = self.evaluator().simulate(&best.chromosome);
        let schedule = build_ledger(&simulation, &self.catalog);

        OptimizationResult {
            chromosome: best.chromosome.to_labels(&self.catalog),
            work_days: simulation.work_day_list(),
            total_earnings: simulation.total_earnings,
            final_balance: simulation.ending_balance,
            min_balance: simulation.min_balance_seen,
            violations: simulation.violation_count,
            computation_time,
            schedule,
            fitness: best.cost(),
            mode: self.resolved.mode,
            termination,
            generations_run: self.generation,
            seed: self.config.params.seed,
            fitness_history: self.best_fitness_history.clone(),
        }
    }
}

/// Index of the best of `k` uniformly sampled individuals
fn tournament_select<R: Rng + ?Sized>(population: &[Individual], k: usize, rng: &mut R) -> usize {
    let mut best_idx = rng.gen_range(0..population.len());
    for _ in 1..k {
        let idx = rng.gen_range(0..population.len());
        if population[idx].cost() < population[best_idx].cost() {
            best_idx = idx;
        }
    }
    best_idx
}
