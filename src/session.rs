//! Saved planning sessions.
//!
//! A session bundles the problem, the last result and the ledger edits
//! made on top of it, stamped with the time it was saved. It is the only
//! persistence format besides the ledger CSV export.

use crate::config::ProblemInput;
use crate::error::Result;
use crate::reconcile::{ScheduleEdit, ScheduleReconciler};
use crate::schedule::{DaySchedule, OptimizationResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub saved_at: DateTime<Utc>,
    pub input: ProblemInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<OptimizationResult>,
    #[serde(default)]
    pub edits: Vec<ScheduleEdit>,
}

/// Flat ledger row for CSV export
#[derive(Debug, Serialize)]
struct LedgerRecord<'a> {
    day: usize,
    shifts: String,
    earnings: f64,
    expenses: f64,
    deposit: f64,
    start_balance: f64,
    end_balance: f64,
    adjustment: f64,
    anchored: bool,
    notes: &'a str,
}

impl<'a> From<&'a DaySchedule> for LedgerRecord<'a> {
    fn from(row: &'a DaySchedule) -> Self {
        LedgerRecord {
            day: row.day,
            shifts: row.shifts.join("+"),
            earnings: row.earnings,
            expenses: row.expenses,
            deposit: row.deposit,
            start_balance: row.start_balance,
            end_balance: row.end_balance,
            adjustment: row.adjustment,
            anchored: row.anchored,
            notes: &row.notes,
        }
    }
}

impl Session {
    pub fn new(input: ProblemInput, result: Option<OptimizationResult>) -> Self {
        Session {
            saved_at: Utc::now(),
            input,
            result,
            edits: Vec::new(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let session: Session = serde_json::from_reader(std::io::BufReader::new(file))?;
        session.input.validate()?;
        Ok(session)
    }

    /// Write the session as pretty JSON, refreshing `saved_at`
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.saved_at = Utc::now();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Apply edits to the stored ledger and remember them
    pub fn apply_edits(&mut self, edits: &[ScheduleEdit]) -> Result<()> {
        if let Some(result) = self.result.as_mut() {
            ScheduleReconciler::apply_edits_to_schedule(
                &mut result.schedule,
                edits,
                self.input.config.starting_balance,
            )?;
            result.refresh_from_schedule(self.input.config.minimum_balance);
        }
        self.edits.extend_from_slice(edits);
        Ok(())
    }

    /// Problem for the next run, with every recorded edit learned as a manual constraint
    pub fn next_input(&self) -> Result<ProblemInput> {
        let catalog = self.input.catalog()?;
        let learned = ScheduleReconciler::generate_manual_constraints(&self.edits, &catalog)?;

        let mut input = self.input.clone();
        for (day, constraint) in learned {
            input
                .config
                .manual_constraints
                .entry(day)
                .or_default()
                .merge(constraint);
        }
        Ok(input)
    }

    /// Export the ledger as CSV; does nothing without a result
    pub fn export_ledger_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        match &self.result {
            Some(result) => write_ledger_csv(&result.schedule, path),
            None => {
                log::warn!("Session has no result, no ledger written");
                Ok(())
            }
        }
    }
}

/// Write ledger rows to a CSV file
pub fn write_ledger_csv<P: AsRef<Path>>(schedule: &[DaySchedule], path: P) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for row in schedule {
        writer.serialize(LedgerRecord::from(row))?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Expense, OptimizationConfig};
    use crate::optimizer::EvolutionEngine;

    fn solved() -> Session {
        let mut config = OptimizationConfig::new(300.0, 800.0, 0.0);
        config.population_size = 20;
        config.generations = 20;
        let mut input = ProblemInput::new(config);
        input.expenses.push(Expense::new(5, 150.0, "groceries"));
        let result = EvolutionEngine::new(&input).unwrap().run_silent().unwrap();
        Session::new(input, Some(result))
    }

    #[test]
    fn test_session_round_trip_through_file() {
        let dir = std::env::temp_dir().join(format!("shift-planner-session-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("session.json");

        let mut session = solved();
        session.apply_edits(&[ScheduleEdit::notes(3, "dentist")]).unwrap();
        session.save(&path).unwrap();

        let loaded = Session::load(&path).unwrap();
        assert_eq!(loaded.input, session.input);
        assert_eq!(loaded.edits, session.edits);
        assert_eq!(
            loaded.result.as_ref().unwrap().schedule,
            session.result.as_ref().unwrap().schedule
        );
        assert_eq!(loaded.saved_at, session.saved_at);

        let csv_path = dir.join("ledger.csv");
        loaded.export_ledger_csv(&csv_path).unwrap();
        let text = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(text.lines().count(), 31);
        assert!(text.starts_with("day,shifts,earnings"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_edits_refresh_result_summary() {
        let mut session = solved();
        session
            .apply_edits(&[ScheduleEdit::expenses(3, 5000.0), ScheduleEdit::earnings(2, 154.0)])
            .unwrap();

        let result = session.result.as_ref().unwrap();
        let rows = &result.schedule;
        let earnings: f64 = rows.iter().map(|r| r.earnings).sum();
        let lowest = rows.iter().map(|r| r.end_balance).fold(f64::INFINITY, f64::min);
        let below = rows.iter().filter(|r| r.end_balance < 0.0).count();
        let work_days: Vec<usize> = rows.iter().filter(|r| r.is_work_day()).map(|r| r.day).collect();

        assert!((result.total_earnings - earnings).abs() < 1e-9);
        assert_eq!(result.min_balance, lowest);
        assert!(result.min_balance < 0.0);
        assert_eq!(result.violations, below);
        assert!(result.violations > 0);
        assert_eq!(result.work_days, work_days);
        assert!(result.work_days.contains(&2));
        assert_eq!(result.final_balance, rows[29].end_balance);
    }

    #[test]
    fn test_edits_become_constraints_for_next_run() {
        let mut session = solved();
        session
            .apply_edits(&[ScheduleEdit::earnings(2, 154.0), ScheduleEdit::balance(10, 500.0)])
            .unwrap();

        let result = session.result.as_ref().unwrap();
        assert_eq!(result.schedule[1].earnings, 154.0);
        assert_eq!(result.schedule[9].end_balance, 500.0);
        assert_eq!(result.final_balance, result.schedule[29].end_balance);

        let next = session.next_input().unwrap();
        let constraints = &next.config.manual_constraints;
        assert_eq!(constraints[&2].shifts.as_deref(), Some("medium+large"));
        assert_eq!(constraints[&10].fixed_balance, Some(500.0));
    }
}
