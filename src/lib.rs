//! Shift Planner Library
//!
//! A genetic optimizer that plans a 30-day month of work shifts so the
//! balance ends on a target without falling under a minimum, honouring
//! manual day-level overrides.
//!
//! # Features
//!
//! - Shift catalog with single and double shifts
//! - Constraint resolution (critical days, required earnings, balance reset)
//! - Normal and Crisis search modes with their own cost strategies
//! - Seeded, reproducible evolution with cancel / pause / resume
//! - Ledger edits with cascading balance recomputation, learned back as constraints
//! - Multi-seed batch runs, sessions, CSV and SVG export
//!
//! # Example
//!
//! ```no_run
//! use shift_planner::config::{Expense, OptimizationConfig, ProblemInput};
//! use shift_planner::optimizer::EvolutionEngine;
//!
//! let mut input = ProblemInput::new(OptimizationConfig::new(250.0, 1500.0, 100.0));
//! input.expenses.push(Expense::new(1, 700.0, "rent"));
//!
//! let mut engine = EvolutionEngine::new(&input).unwrap();
//! let result = engine.run_silent().unwrap();
//!
//! println!("Final balance: {:.2}", result.final_balance);
//! ```

pub mod error;
pub mod shifts;
pub mod config;
pub mod constraints;
pub mod control;
pub mod optimizer;
pub mod schedule;
pub mod reconcile;
pub mod session;
pub mod batch;
pub mod visualization;

pub use config::{OptimizationConfig, ProblemInput};
pub use error::{PlannerError, Result};
pub use optimizer::EvolutionEngine;
pub use schedule::{DaySchedule, OptimizationResult};
pub use shifts::ShiftCatalog;
