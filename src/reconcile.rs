//! Ledger edits and their translation back into constraints.
//!
//! A user correcting the ledger by hand goes through two steps: the edits
//! are applied to the rows with the balance chain recomputed forward, and
//! the same edits are turned into [`ManualConstraint`]s so the next run
//! keeps them.

use crate::config::{is_valid_day, ManualConstraint, OptimizationConfig, DAYS_IN_MONTH};
use crate::error::{PlannerError, Result};
use crate::schedule::DaySchedule;
use crate::shifts::ShiftCatalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Earnings edits within this distance of a combination's net pay become a shift constraint
pub const EARNINGS_MATCH_TOLERANCE: f64 = 1.0;

/// Allowed drift between recomputed and stored balances
pub const BALANCE_TOLERANCE: f64 = 0.01;

/// The field an edit touches and its new value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditField {
    Earnings(f64),
    Expenses(f64),
    /// End-of-day balance; anchors the row
    Balance(f64),
    Notes(String),
}

/// One cell changed in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEdit {
    pub day: usize,
    pub field: EditField,
}

impl ScheduleEdit {
    pub fn earnings(day: usize, amount: f64) -> Self {
        ScheduleEdit { day, field: EditField::Earnings(amount) }
    }

    pub fn expenses(day: usize, amount: f64) -> Self {
        ScheduleEdit { day, field: EditField::Expenses(amount) }
    }

    pub fn balance(day: usize, amount: f64) -> Self {
        ScheduleEdit { day, field: EditField::Balance(amount) }
    }

    pub fn notes(day: usize, text: &str) -> Self {
        ScheduleEdit { day, field: EditField::Notes(text.to_string()) }
    }

    fn check(&self, rows: usize) -> Result<()> {
        let invalid = |reason: &str| PlannerError::InvalidEdit {
            day: self.day,
            reason: reason.to_string(),
        };
        if !is_valid_day(self.day) {
            return Err(invalid("day out of range"));
        }
        if self.day > rows {
            return Err(invalid("no ledger row for this day"));
        }
        match &self.field {
            EditField::Earnings(v) | EditField::Expenses(v) | EditField::Balance(v) if !v.is_finite() => {
                Err(invalid("amount must be finite"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// Something wrong with a ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ValidationIssue {
    WrongLength { expected: usize, actual: usize },
    DayOutOfOrder { position: usize, day: usize },
    /// Start balance differs from the previous row's end balance
    ChainBreak { day: usize, expected: f64, actual: f64 },
    /// End balance differs from what the row's own fields imply
    EquationMismatch { day: usize, expected: f64, actual: f64 },
    BelowMinimum { day: usize, balance: f64, minimum: f64 },
    /// Final balance more than 10% away from the target
    TargetDeviation { final_balance: f64, target: f64 },
}

impl ValidationIssue {
    pub fn severity(&self) -> Severity {
        match self {
            ValidationIssue::TargetDeviation { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationIssue::WrongLength { expected, actual } => {
                write!(f, "ledger has {} rows, expected {}", actual, expected)
            }
            ValidationIssue::DayOutOfOrder { position, day } => {
                write!(f, "row {} holds day {}", position + 1, day)
            }
            ValidationIssue::ChainBreak { day, expected, actual } => write!(
                f,
                "day {}: start balance {:.2} does not follow previous end balance {:.2}",
                day, actual, expected
            ),
            ValidationIssue::EquationMismatch { day, expected, actual } => write!(
                f,
                "day {}: end balance {:.2} but the row adds up to {:.2}",
                day, actual, expected
            ),
            ValidationIssue::BelowMinimum { day, balance, minimum } => write!(
                f,
                "day {}: balance {:.2} below minimum {:.2}",
                day, balance, minimum
            ),
            ValidationIssue::TargetDeviation { final_balance, target } => write!(
                f,
                "final balance {:.2} is more than 10% away from target {:.2}",
                final_balance, target
            ),
        }
    }
}

/// Outcome of [`ScheduleReconciler::validate_schedule`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// No error-level issue; warnings are allowed
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity() == Severity::Warning)
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Ledger OK");
        }
        for issue in &self.issues {
            let tag = match issue.severity() {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            writeln!(f, "  [{}] {}", tag, issue)?;
        }
        Ok(())
    }
}

/// Ledger edit, inversion and validation; stateless
pub struct ScheduleReconciler;

impl ScheduleReconciler {
    /// Apply edits in order and recompute balances from the earliest edited day.
    ///
    /// Anchored rows keep their end balance; their adjustment absorbs the change.
    /// Nothing is modified when any edit is invalid.
    pub fn apply_edits_to_schedule(
        schedule: &mut [DaySchedule],
        edits: &[ScheduleEdit],
        starting_balance: f64,
    ) -> Result<()> {
        for edit in edits {
            edit.check(schedule.len())?;
        }

        let mut earliest = None;
        for edit in edits {
            let row = &mut schedule[edit.day - 1];
            match &edit.field {
                EditField::Earnings(v) => row.earnings = *v,
                EditField::Expenses(v) => row.expenses = *v,
                EditField::Balance(v) => {
                    row.end_balance = *v;
                    row.anchored = true;
                }
                EditField::Notes(text) => {
                    row.notes = text.clone();
                    continue;
                }
            }
            earliest = Some(earliest.map_or(edit.day, |d: usize| d.min(edit.day)));
        }

        if let Some(day) = earliest {
            Self::recompute_from(schedule, day, starting_balance);
        }
        Ok(())
    }

    /// Re-chain balances from `day` to the end of the ledger
    pub fn recompute_from(schedule: &mut [DaySchedule], day: usize, starting_balance: f64) {
        let first = day.max(1) - 1;
        for i in first..schedule.len() {
            let start = if i == 0 {
                starting_balance
            } else {
                schedule[i - 1].end_balance
            };
            let row = &mut schedule[i];
            row.start_balance = start;
            let natural = row.natural_end_balance();
            if row.anchored {
                row.adjustment = row.end_balance - natural;
            } else {
                row.adjustment = 0.0;
                row.end_balance = natural;
            }
        }
    }

    /// Turn ledger edits into constraints for the next run.
    ///
    /// Earnings matching a combination's net pay become a shift constraint;
    /// notes carry no constraint.
    pub fn generate_manual_constraints(
        edits: &[ScheduleEdit],
        catalog: &ShiftCatalog,
    ) -> Result<BTreeMap<usize, ManualConstraint>> {
        let mut constraints: BTreeMap<usize, ManualConstraint> = BTreeMap::new();

        for edit in edits {
            edit.check(DAYS_IN_MONTH)?;
            let constraint = match &edit.field {
                EditField::Earnings(v) => match catalog.match_net_pay(*v, EARNINGS_MATCH_TOLERANCE) {
                    Some(id) => ManualConstraint::shift(&catalog.combination(id).label),
                    None => ManualConstraint::earnings(*v),
                },
                EditField::Expenses(v) => ManualConstraint::expense(*v),
                EditField::Balance(v) => ManualConstraint::balance(*v),
                EditField::Notes(_) => continue,
            };
            constraints.entry(edit.day).or_default().merge(constraint);
        }

        Ok(constraints)
    }

    /// Check row order, the balance chain, the minimum floor and the target
    pub fn validate_schedule(schedule: &[DaySchedule], config: &OptimizationConfig) -> ValidationReport {
        let mut issues = Vec::new();

        if schedule.len() != DAYS_IN_MONTH {
            issues.push(ValidationIssue::WrongLength {
                expected: DAYS_IN_MONTH,
                actual: schedule.len(),
            });
        }

        let mut previous_end = config.starting_balance;
        for (position, row) in schedule.iter().enumerate() {
            if row.day != position + 1 {
                issues.push(ValidationIssue::DayOutOfOrder { position, day: row.day });
            }
            if (row.start_balance - previous_end).abs() > BALANCE_TOLERANCE {
                issues.push(ValidationIssue::ChainBreak {
                    day: row.day,
                    expected: previous_end,
                    actual: row.start_balance,
                });
            }
            // only anchored rows may carry an adjustment
            let expected = if row.anchored {
                row.expected_end_balance()
            } else {
                row.natural_end_balance()
            };
            if (row.end_balance - expected).abs() > BALANCE_TOLERANCE {
                issues.push(ValidationIssue::EquationMismatch {
                    day: row.day,
                    expected,
                    actual: row.end_balance,
                });
            }
            if row.end_balance < config.minimum_balance {
                issues.push(ValidationIssue::BelowMinimum {
                    day: row.day,
                    balance: row.end_balance,
                    minimum: config.minimum_balance,
                });
            }
            previous_end = row.end_balance;
        }

        if let Some(last) = schedule.last() {
            let target = config.target_ending_balance;
            if (last.end_balance - target).abs() > 0.1 * target.abs() {
                issues.push(ValidationIssue::TargetDeviation {
                    final_balance: last.end_balance,
                    target,
                });
            }
        }

        ValidationReport { issues }
    }
}
