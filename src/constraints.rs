//! Constraint resolution.
//!
//! Turns an [`OptimizationConfig`] plus the dated expense and deposit lists
//! into the per-day arrays, the effective search window, the earnings the
//! schedule has to produce and the days that need covering. Everything the
//! generator and the evaluator agree on is decided here once, including the
//! search mode.

use crate::config::{
    is_valid_day, BalanceReset, Deposit, Expense, OptimizationConfig, DAYS_IN_MONTH,
};
use crate::error::Result;
use crate::shifts::{ComboId, ShiftCatalog};
use serde::{Deserialize, Serialize};

/// How aggressively the month has to be worked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Single shifts on the free days can cover what is needed
    Normal,
    /// Even a large shift on every free day falls short
    Crisis,
}

impl SearchMode {
    /// Crisis iff `required / available_days > large_net`.
    ///
    /// Written as a product so that a window with no free day is Crisis
    /// exactly when anything at all is required.
    pub fn resolve(required_earnings: f64, available_days: usize, large_net: f64) -> Self {
        if required_earnings > available_days as f64 * large_net {
            SearchMode::Crisis
        } else {
            SearchMode::Normal
        }
    }

    pub fn is_crisis(self) -> bool {
        self == SearchMode::Crisis
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchMode::Normal => write!(f, "normal"),
            SearchMode::Crisis => write!(f, "crisis"),
        }
    }
}

/// Manual overrides that take a day out of the search
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LockedDay {
    pub combo: Option<ComboId>,
    pub fixed_earnings: Option<f64>,
    pub fixed_balance: Option<f64>,
}

impl LockedDay {
    /// Earnings the day contributes regardless of the chromosome
    pub fn earnings(&self, catalog: &ShiftCatalog) -> f64 {
        match (self.fixed_earnings, self.combo) {
            (Some(amount), _) => amount,
            (None, Some(combo)) => catalog.net_pay(combo),
            (None, None) => 0.0,
        }
    }
}

/// Output of [`ConstraintResolver::resolve`]
#[derive(Debug, Clone)]
pub struct ResolvedConstraints {
    /// Expense per day, index `day - 1`
    pub expenses: Vec<f64>,
    /// Deposit per day, index `day - 1`
    pub deposits: Vec<f64>,
    /// Locked days, index `day - 1`
    pub locked: Vec<Option<LockedDay>>,
    pub starting_balance: f64,
    pub target_ending_balance: f64,
    pub minimum_balance: f64,
    pub balance_reset: Option<BalanceReset>,
    /// First day the search may assign shifts to
    pub effective_start_day: usize,
    /// Balance entering `effective_start_day`
    pub effective_starting_balance: f64,
    pub required_earnings: f64,
    /// Ascending days on which the balance, without earnings, dips below the buffer
    pub critical_days: Vec<usize>,
    /// Unlocked days in the effective window
    pub available_days: usize,
    pub mode: SearchMode,
}

impl ResolvedConstraints {
    #[inline]
    pub fn expense(&self, day: usize) -> f64 {
        self.expenses[day - 1]
    }

    #[inline]
    pub fn deposit(&self, day: usize) -> f64 {
        self.deposits[day - 1]
    }

    #[inline]
    pub fn locked_day(&self, day: usize) -> Option<&LockedDay> {
        self.locked[day - 1].as_ref()
    }

    #[inline]
    pub fn is_locked(&self, day: usize) -> bool {
        self.locked[day - 1].is_some()
    }

    /// Days the search may change: in the effective window and not locked
    pub fn is_mutable(&self, day: usize) -> bool {
        day >= self.effective_start_day && !self.is_locked(day)
    }

    /// Days of the effective window, in order
    pub fn window(&self) -> std::ops::RangeInclusive<usize> {
        self.effective_start_day..=DAYS_IN_MONTH
    }

    pub fn mutable_days(&self) -> Vec<usize> {
        self.window().filter(|&d| !self.is_locked(d)).collect()
    }

    pub fn is_reset_day(&self, day: usize) -> bool {
        self.balance_reset.map_or(false, |r| r.day == day)
    }
}

/// Stateless resolver; see the module docs
pub struct ConstraintResolver;

impl ConstraintResolver {
    pub fn resolve(
        config: &OptimizationConfig,
        expenses: &[Expense],
        deposits: &[Deposit],
        catalog: &ShiftCatalog,
        buffer_margin: f64,
    ) -> Result<ResolvedConstraints> {
        let mut expense_by_day = vec![0.0; DAYS_IN_MONTH];
        let mut deposit_by_day = vec![0.0; DAYS_IN_MONTH];

        for expense in expenses {
            if is_valid_day(expense.day) {
                expense_by_day[expense.day - 1] += expense.amount;
            } else {
                log::warn!(
                    "Ignoring expense `{}` on invalid day {}",
                    expense.description,
                    expense.day
                );
            }
        }
        for deposit in deposits {
            if is_valid_day(deposit.day) {
                deposit_by_day[deposit.day - 1] += deposit.amount;
            } else {
                log::warn!(
                    "Ignoring deposit `{}` on invalid day {}",
                    deposit.description,
                    deposit.day
                );
            }
        }

        let mut locked = vec![None; DAYS_IN_MONTH];
        for (day, constraint) in &config.manual_constraints {
            if !is_valid_day(*day) {
                log::warn!("Ignoring manual constraint on invalid day {}", day);
                continue;
            }
            if let Some(amount) = constraint.fixed_expense {
                expense_by_day[day - 1] = amount;
            }
            if constraint.is_locked() {
                let combo = match &constraint.shifts {
                    Some(label) => Some(catalog.parse_label(label)?),
                    None => None,
                };
                locked[day - 1] = Some(LockedDay {
                    combo,
                    fixed_earnings: constraint.fixed_earnings,
                    fixed_balance: constraint.fixed_balance,
                });
            }
        }

        let (effective_start_day, effective_starting_balance) = match config.balance_reset {
            Some(reset) => (reset.day + 1, reset.new_balance),
            None => (1, config.starting_balance),
        };

        let window = effective_start_day..=DAYS_IN_MONTH;
        let window_expenses: f64 = window.clone().map(|d| expense_by_day[d - 1]).sum();
        let window_deposits: f64 = window.clone().map(|d| deposit_by_day[d - 1]).sum();
        let required_earnings = (window_expenses + config.target_ending_balance
            - effective_starting_balance
            - window_deposits)
            .max(0.0);

        let floor = config.minimum_balance + buffer_margin;
        let mut balance = effective_starting_balance;
        let mut critical_days = Vec::new();
        for day in window.clone() {
            balance += deposit_by_day[day - 1] - expense_by_day[day - 1];
            if balance < floor {
                critical_days.push(day);
            }
        }

        let available_days = window.filter(|&d| locked[d - 1].is_none()).count();
        let mode = SearchMode::resolve(required_earnings, available_days, catalog.large_net());

        Ok(ResolvedConstraints {
            expenses: expense_by_day,
            deposits: deposit_by_day,
            locked,
            starting_balance: config.starting_balance,
            target_ending_balance: config.target_ending_balance,
            minimum_balance: config.minimum_balance,
            balance_reset: config.balance_reset,
            effective_start_day,
            effective_starting_balance,
            required_earnings,
            critical_days,
            available_days,
            mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManualConstraint;
    use crate::error::PlannerError;

    fn resolve(config: &OptimizationConfig, expenses: &[Expense], deposits: &[Deposit]) -> ResolvedConstraints {
        ConstraintResolver::resolve(config, expenses, deposits, &ShiftCatalog::standard(), 200.0).unwrap()
    }

    #[test]
    fn test_aggregates_and_overrides_expenses() {
        let mut config = OptimizationConfig::new(1000.0, 1000.0, 0.0);
        config
            .manual_constraints
            .insert(3, ManualConstraint::expense(40.0));

        let expenses = vec![
            Expense::new(2, 100.0, "phone"),
            Expense::new(2, 50.0, "gym"),
            Expense::new(3, 500.0, "insurance"),
            Expense::new(0, 999.0, "bogus"),
            Expense::new(31, 999.0, "bogus"),
        ];
        let deposits = vec![Deposit::new(4, 25.0, "refund")];
        let resolved = resolve(&config, &expenses, &deposits);

        assert_eq!(resolved.expenses.len(), DAYS_IN_MONTH);
        assert_eq!(resolved.expense(2), 150.0);
        assert_eq!(resolved.expense(3), 40.0);
        assert_eq!(resolved.deposit(4), 25.0);
        assert_eq!(resolved.expenses.iter().sum::<f64>(), 190.0);
        // a fixed expense alone does not lock the day
        assert!(!resolved.is_locked(3));
    }

    #[test]
    fn test_required_earnings_and_window() {
        let config = OptimizationConfig::new(200.0, 1000.0, 0.0);
        let expenses = vec![Expense::new(1, 700.0, "rent")];
        let deposits = vec![Deposit::new(15, 100.0, "gift")];
        let resolved = resolve(&config, &expenses, &deposits);

        assert_eq!(resolved.effective_start_day, 1);
        assert_eq!(resolved.effective_starting_balance, 200.0);
        assert!((resolved.required_earnings - 1400.0).abs() < 1e-9);
        assert_eq!(resolved.available_days, 30);
        assert_eq!(resolved.mode, SearchMode::Normal);
    }

    #[test]
    fn test_required_earnings_floored_at_zero() {
        let config = OptimizationConfig::new(5000.0, 1000.0, 0.0);
        let resolved = resolve(&config, &[], &[]);
        assert_eq!(resolved.required_earnings, 0.0);
        assert!(resolved.critical_days.is_empty());
    }

    #[test]
    fn test_balance_reset_moves_window() {
        let mut config = OptimizationConfig::new(0.0, 600.0, 0.0);
        config.balance_reset = Some(BalanceReset { day: 10, new_balance: 500.0 });
        let expenses = vec![Expense::new(5, 300.0, "early"), Expense::new(20, 100.0, "late")];
        let resolved = resolve(&config, &expenses, &[]);

        assert_eq!(resolved.effective_start_day, 11);
        assert_eq!(resolved.effective_starting_balance, 500.0);
        assert!((resolved.required_earnings - 200.0).abs() < 1e-9);
        assert_eq!(resolved.available_days, 20);
        assert!(resolved.is_reset_day(10));
        assert!(!resolved.is_mutable(10));
        assert!(resolved.is_mutable(11));
    }

    #[test]
    fn test_critical_days_use_buffer() {
        let config = OptimizationConfig::new(500.0, 500.0, 100.0);
        let expenses = vec![Expense::new(10, 150.0, "bill"), Expense::new(20, 100.0, "bill")];
        let resolved = resolve(&config, &expenses, &[]);

        // 350 stays above 300 until day 20 drops it to 250
        assert_eq!(resolved.critical_days, (20..=30).collect::<Vec<_>>());
    }

    #[test]
    fn test_locked_days_reduce_availability() {
        let mut config = OptimizationConfig::new(0.0, 500.0, 0.0);
        config.manual_constraints.insert(2, ManualConstraint::shift("large+medium"));
        config.manual_constraints.insert(4, ManualConstraint::earnings(120.0));
        config.manual_constraints.insert(6, ManualConstraint::balance(300.0));
        config.manual_constraints.insert(45, ManualConstraint::shift("large"));
        let catalog = ShiftCatalog::standard();
        let resolved = ConstraintResolver::resolve(&config, &[], &[], &catalog, 200.0).unwrap();

        assert_eq!(resolved.available_days, 27);
        let day2 = resolved.locked_day(2).unwrap();
        assert_eq!(catalog.combination(day2.combo.unwrap()).label, "medium+large");
        assert_eq!(resolved.locked_day(4).unwrap().earnings(&catalog), 120.0);
        assert_eq!(resolved.locked_day(6).unwrap().fixed_balance, Some(300.0));
        assert_eq!(resolved.mutable_days().len(), 27);
    }

    #[test]
    fn test_malformed_shift_label_fails() {
        let mut config = OptimizationConfig::new(0.0, 500.0, 0.0);
        config.manual_constraints.insert(2, ManualConstraint::shift("gigantic"));
        let err = ConstraintResolver::resolve(&config, &[], &[], &ShiftCatalog::standard(), 200.0)
            .unwrap_err();
        assert!(matches!(err, PlannerError::UnknownShift { .. }));
    }

    #[test]
    fn test_crisis_iff_ratio_exceeds_large_net() {
        let large = ShiftCatalog::standard().large_net();
        assert_eq!(SearchMode::resolve(30.0 * large, 30, large), SearchMode::Normal);
        assert_eq!(SearchMode::resolve(30.0 * large + 0.01, 30, large), SearchMode::Crisis);
        assert_eq!(SearchMode::resolve(0.0, 0, large), SearchMode::Normal);
        assert_eq!(SearchMode::resolve(1.0, 0, large), SearchMode::Crisis);

        let config = OptimizationConfig::new(0.0, 5000.0, 0.0);
        assert_eq!(resolve(&config, &[], &[]).mode, SearchMode::Crisis);
    }
}
