//! Multi-seed batch runs.
//!
//! Runs the same problem under several seeds, each run owning its own
//! engine and RNG, and summarises how stable the search is.

use crate::config::ProblemInput;
use crate::error::{PlannerError, Result};
use crate::optimizer::EvolutionEngine;
use crate::schedule::{OptimizationResult, Termination};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::fs::File;
use std::path::Path;

/// One row per seed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub seed: u64,
    pub fitness: f64,
    pub final_balance: f64,
    pub min_balance: f64,
    pub work_days: usize,
    pub violations: usize,
    pub generations_run: usize,
    pub termination: Termination,
    pub computation_time: String,
}

impl RunSummary {
    fn from_result(result: &OptimizationResult) -> Self {
        RunSummary {
            seed: result.seed,
            fitness: result.fitness,
            final_balance: result.final_balance,
            min_balance: result.min_balance,
            work_days: result.work_days.len(),
            violations: result.violations,
            generations_run: result.generations_run,
            termination: result.termination,
            computation_time: result.computation_time.clone(),
        }
    }
}

/// Aggregates over every run of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub runs: usize,
    pub mean_fitness: f64,
    pub std_fitness: f64,
    pub best_fitness: f64,
    pub best_seed: u64,
    pub mean_final_balance: f64,
    pub mean_work_days: f64,
    /// Share of runs that never dipped below the minimum balance
    pub zero_violation_rate: f64,
}

/// Batch configuration
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub seeds: Vec<u64>,
    pub parallel: bool,
}

impl BatchConfig {
    /// `count` consecutive seeds starting at `first`
    pub fn consecutive(first: u64, count: usize) -> Self {
        BatchConfig {
            seeds: (0..count as u64).map(|i| first.wrapping_add(i)).collect(),
            parallel: true,
        }
    }
}

pub struct BatchRunner {
    input: ProblemInput,
    config: BatchConfig,
    runs: Vec<RunSummary>,
}

impl BatchRunner {
    pub fn new(input: ProblemInput, config: BatchConfig) -> Self {
        BatchRunner {
            input,
            config,
            runs: Vec::new(),
        }
    }

    fn run_seed(input: &ProblemInput, seed: u64) -> Result<RunSummary> {
        let mut input = input.clone();
        input.config.params.seed = seed;
        let result = EvolutionEngine::new(&input)?.run_silent()?;
        Ok(RunSummary::from_result(&result))
    }

    /// Run every seed; summaries come back in seed order either way
    pub fn run(&mut self) -> Result<&[RunSummary]> {
        if self.config.seeds.is_empty() {
            return Err(PlannerError::InvalidConfig("batch needs at least one seed".to_string()));
        }

        log::info!(
            "Running batch of {} seeds ({})",
            self.config.seeds.len(),
            if self.config.parallel { "parallel" } else { "sequential" }
        );

        let input = &self.input;
        self.runs = if self.config.parallel {
            self.config
                .seeds
                .par_iter()
                .map(|&seed| Self::run_seed(input, seed))
                .collect::<Result<Vec<_>>>()?
        } else {
            self.config
                .seeds
                .iter()
                .map(|&seed| Self::run_seed(input, seed))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(&self.runs)
    }

    pub fn runs(&self) -> &[RunSummary] {
        &self.runs
    }

    /// `None` before the batch has run
    pub fn statistics(&self) -> Option<BatchStatistics> {
        let best = self
            .runs
            .iter()
            .min_by(|a, b| a.fitness.total_cmp(&b.fitness))?;

        let fitness: Vec<f64> = self.runs.iter().map(|r| r.fitness).collect();
        let balances: Vec<f64> = self.runs.iter().map(|r| r.final_balance).collect();
        let work_days: Vec<f64> = self.runs.iter().map(|r| r.work_days as f64).collect();
        let clean = self.runs.iter().filter(|r| r.violations == 0).count();

        Some(BatchStatistics {
            runs: self.runs.len(),
            mean_fitness: fitness.iter().mean(),
            std_fitness: fitness.iter().population_std_dev(),
            best_fitness: best.fitness,
            best_seed: best.seed,
            mean_final_balance: balances.iter().mean(),
            mean_work_days: work_days.iter().mean(),
            zero_violation_rate: clean as f64 / self.runs.len() as f64,
        })
    }

    /// One CSV row per run
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);
        for run in &self.runs {
            writer.serialize(run)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("        Shift Planner Batch Report\n");
        report.push_str("========================================\n\n");

        report.push_str(&format!(
            "{:>8} {:>12} {:>12} {:>10} {:>10} {:>12}\n",
            "Seed", "Fitness", "Balance", "Work days", "Violations", "Termination"
        ));
        report.push_str("-".repeat(70).as_str());
        report.push('\n');
        for run in &self.runs {
            report.push_str(&format!(
                "{:>8} {:>12.2} {:>12.2} {:>10} {:>10} {:>12}\n",
                run.seed,
                run.fitness,
                run.final_balance,
                run.work_days,
                run.violations,
                run.termination.to_string()
            ));
        }
        report.push_str("-".repeat(70).as_str());
        report.push('\n');

        if let Some(stats) = self.statistics() {
            report.push_str(&format!(
                "\nFitness: mean {:.2}, std {:.2}, best {:.2} (seed {})\n",
                stats.mean_fitness, stats.std_fitness, stats.best_fitness, stats.best_seed
            ));
            report.push_str(&format!(
                "Mean final balance: {:.2}\nMean work days: {:.1}\nRuns without violations: {:.0}%\n",
                stats.mean_final_balance,
                stats.mean_work_days,
                stats.zero_violation_rate * 100.0
            ));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptimizationConfig;

    fn input() -> ProblemInput {
        let mut config = OptimizationConfig::new(250.0, 900.0, 0.0);
        config.population_size = 60;
        config.generations = 25;
        ProblemInput::new(config)
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut parallel = BatchRunner::new(input(), BatchConfig::consecutive(10, 4));
        let mut sequential = BatchRunner::new(
            input(),
            BatchConfig {
                seeds: vec![10, 11, 12, 13],
                parallel: false,
            },
        );
        parallel.run().unwrap();
        sequential.run().unwrap();

        let seeds: Vec<u64> = parallel.runs().iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![10, 11, 12, 13]);
        for (a, b) in parallel.runs().iter().zip(sequential.runs()) {
            assert_eq!(a.fitness, b.fitness);
            assert_eq!(a.final_balance, b.final_balance);
        }
    }

    #[test]
    fn test_statistics() {
        let mut runner = BatchRunner::new(input(), BatchConfig::consecutive(1, 3));
        assert!(runner.statistics().is_none());
        runner.run().unwrap();

        let stats = runner.statistics().unwrap();
        assert_eq!(stats.runs, 3);
        assert!(stats.best_fitness <= stats.mean_fitness);
        assert!(stats.std_fitness >= 0.0);
        assert!((0.0..=1.0).contains(&stats.zero_violation_rate));
        assert!(runner.generate_report().contains("Batch Report"));
    }

    #[test]
    fn test_consecutive_seeds_wrap_at_the_top() {
        let config = BatchConfig::consecutive(u64::MAX - 1, 3);
        assert_eq!(config.seeds, vec![u64::MAX - 1, u64::MAX, 0]);
        assert!(BatchConfig::consecutive(7, 0).seeds.is_empty());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let mut runner = BatchRunner::new(input(), BatchConfig { seeds: vec![], parallel: true });
        assert!(runner.run().is_err());
    }
}
