//! Shift catalog and pay model.
//!
//! A day is either off or worked as one of a fixed set of shift
//! combinations: each of the three shift types on its own, or any
//! unordered pair of them (a "double"). Combinations are addressed by a
//! small integer id so chromosomes stay cheap to copy.

use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};

/// Index of a shift combination in the catalog's combination table.
pub type ComboId = usize;

/// A single kind of shift and what it pays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftType {
    /// Name used in shift labels (`"large"`, `"medium+large"`, ...)
    pub name: String,
    /// Pay before deductions
    pub gross_pay: f64,
    /// Pay that actually lands in the balance
    pub net_pay: f64,
}

impl ShiftType {
    pub fn new(name: &str, gross_pay: f64, net_pay: f64) -> Self {
        ShiftType {
            name: name.to_string(),
            gross_pay,
            net_pay,
        }
    }
}

/// Pay tier of a shift type, ranked by net pay
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftTier {
    Small = 0,
    Medium = 1,
    Large = 2,
}

impl ShiftTier {
    pub const ALL: [ShiftTier; 3] = [ShiftTier::Small, ShiftTier::Medium, ShiftTier::Large];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One or two shift types worked on the same day
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftCombination {
    /// Canonical label, tiers joined by `+` in ascending order
    pub label: String,
    /// Tiers worked, ascending
    pub tiers: Vec<ShiftTier>,
    pub gross_pay: f64,
    pub net_pay: f64,
}

impl ShiftCombination {
    pub fn is_double(&self) -> bool {
        self.tiers.len() == 2
    }
}

/// The three shift types of a run and every combination they allow.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftCatalog {
    /// Indexed by `ShiftTier`
    types: Vec<ShiftType>,
    combinations: Vec<ShiftCombination>,
}

impl ShiftCatalog {
    /// The catalog used when the problem file does not bring its own
    pub fn standard() -> Self {
        let types = vec![
            ShiftType::new("small", 64.0, 56.0),
            ShiftType::new("medium", 75.5, 67.5),
            ShiftType::new("large", 94.5, 86.5),
        ];
        Self::from_ranked(types)
    }

    /// Build a catalog from three shift types in any order.
    ///
    /// Tiers are assigned by ascending net pay.
    pub fn new(mut types: Vec<ShiftType>) -> Result<Self> {
        if types.len() != 3 {
            return Err(PlannerError::InvalidCatalog(format!(
                "expected exactly 3 shift types, got {}",
                types.len()
            )));
        }

        for shift in &types {
            let name = shift.name.trim();
            if name.is_empty() || name.contains('+') {
                return Err(PlannerError::InvalidCatalog(format!(
                    "shift name `{}` must be non-empty and must not contain `+`",
                    shift.name
                )));
            }
            if !shift.net_pay.is_finite() || !shift.gross_pay.is_finite() || shift.net_pay < 0.0 {
                return Err(PlannerError::InvalidCatalog(format!(
                    "shift `{}` has invalid pay (gross {}, net {})",
                    shift.name, shift.gross_pay, shift.net_pay
                )));
            }
        }

        for i in 0..types.len() {
            for j in i + 1..types.len() {
                if types[i].name.trim().eq_ignore_ascii_case(types[j].name.trim()) {
                    return Err(PlannerError::InvalidCatalog(format!(
                        "duplicate shift name `{}`",
                        types[i].name
                    )));
                }
            }
        }

        types.sort_by(|a, b| a.net_pay.total_cmp(&b.net_pay));
        for shift in &mut types {
            shift.name = shift.name.trim().to_string();
        }

        Ok(Self::from_ranked(types))
    }

    fn from_ranked(types: Vec<ShiftType>) -> Self {
        let mut combinations = Vec::with_capacity(9);

        for tier in ShiftTier::ALL {
            let shift = &types[tier.index()];
            combinations.push(ShiftCombination {
                label: shift.name.clone(),
                tiers: vec![tier],
                gross_pay: shift.gross_pay,
                net_pay: shift.net_pay,
            });
        }

        for (i, &first) in ShiftTier::ALL.iter().enumerate() {
            for &second in &ShiftTier::ALL[i..] {
                let a = &types[first.index()];
                let b = &types[second.index()];
                combinations.push(ShiftCombination {
                    label: format!("{}+{}", a.name, b.name),
                    tiers: vec![first, second],
                    gross_pay: a.gross_pay + b.gross_pay,
                    net_pay: a.net_pay + b.net_pay,
                });
            }
        }

        ShiftCatalog { types, combinations }
    }

    pub fn types(&self) -> &[ShiftType] {
        &self.types
    }

    pub fn shift_type(&self, tier: ShiftTier) -> &ShiftType {
        &self.types[tier.index()]
    }

    pub fn combinations(&self) -> &[ShiftCombination] {
        &self.combinations
    }

    pub fn combination(&self, id: ComboId) -> &ShiftCombination {
        &self.combinations[id]
    }

    pub fn len(&self) -> usize {
        self.combinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combinations.is_empty()
    }

    /// Id of a single-shift combination
    #[inline]
    pub fn single(&self, tier: ShiftTier) -> ComboId {
        tier.index()
    }

    /// Id of the double combining `a` and `b`, in either order
    pub fn double(&self, a: ShiftTier, b: ShiftTier) -> ComboId {
        let (lo, hi) = if a <= b { (a.index(), b.index()) } else { (b.index(), a.index()) };
        // doubles are laid out row by row: (0,0) (0,1) (0,2) (1,1) (1,2) (2,2)
        let row_start = [0, 3, 5];
        3 + row_start[lo] + (hi - lo)
    }

    /// Ids of every double combination
    pub fn doubles(&self) -> std::ops::Range<ComboId> {
        3..self.combinations.len()
    }

    #[inline]
    pub fn net_pay(&self, id: ComboId) -> f64 {
        self.combinations[id].net_pay
    }

    /// Net pay of one large shift, the Crisis-mode threshold per day
    pub fn large_net(&self) -> f64 {
        self.types[ShiftTier::Large.index()].net_pay
    }

    /// Highest net pay a single day can produce
    pub fn best_day_net(&self) -> f64 {
        self.net_pay(self.double(ShiftTier::Large, ShiftTier::Large))
    }

    pub fn average_double_net(&self) -> f64 {
        let doubles = self.doubles();
        let count = doubles.len() as f64;
        doubles.map(|id| self.net_pay(id)).sum::<f64>() / count
    }

    /// Parse a label such as `"large"`, `"medium+large"` or `"large+medium"`.
    pub fn parse_label(&self, label: &str) -> Result<ComboId> {
        let unknown = || PlannerError::UnknownShift {
            label: label.to_string(),
        };

        let mut tiers = Vec::with_capacity(2);
        for part in label.split('+') {
            let name = part.trim();
            let tier = ShiftTier::ALL
                .into_iter()
                .find(|&t| self.types[t.index()].name.eq_ignore_ascii_case(name))
                .ok_or_else(unknown)?;
            tiers.push(tier);
        }

        match tiers.as_slice() {
            [single] => Ok(self.single(*single)),
            [a, b] => Ok(self.double(*a, *b)),
            _ => Err(unknown()),
        }
    }

    /// Closest combination whose net pay is within `tolerance` of `amount`
    pub fn match_net_pay(&self, amount: f64, tolerance: f64) -> Option<ComboId> {
        self.combinations
            .iter()
            .enumerate()
            .map(|(id, combo)| (id, (combo.net_pay - amount).abs()))
            .filter(|&(_, diff)| diff <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}

impl Default for ShiftCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl std::fmt::Display for ShiftCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Shift catalog:")?;
        for combo in &self.combinations {
            writeln!(
                f,
                "  {:<16} gross {:>8.2}  net {:>8.2}",
                combo.label, combo.gross_pay, combo.net_pay
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_layout() {
        let catalog = ShiftCatalog::standard();
        assert_eq!(catalog.len(), 9);
        assert_eq!(catalog.combination(0).label, "small");
        assert_eq!(catalog.combination(2).label, "large");
        assert_eq!(catalog.doubles().count(), 6);

        let ll = catalog.double(ShiftTier::Large, ShiftTier::Large);
        assert_eq!(catalog.combination(ll).label, "large+large");
        assert!((catalog.best_day_net() - 173.0).abs() < 1e-9);
    }

    #[test]
    fn test_double_lookup_is_order_independent() {
        let catalog = ShiftCatalog::standard();
        for a in ShiftTier::ALL {
            for b in ShiftTier::ALL {
                let id = catalog.double(a, b);
                assert_eq!(id, catalog.double(b, a));
                assert!(catalog.combination(id).is_double());
                assert!(catalog.combination(id).tiers.contains(&a));
                assert!(catalog.combination(id).tiers.contains(&b));
            }
        }
    }

    #[test]
    fn test_parse_labels() {
        let catalog = ShiftCatalog::standard();
        let ml = catalog.parse_label("medium+large").unwrap();
        assert_eq!(catalog.parse_label("large+medium").unwrap(), ml);
        assert_eq!(catalog.parse_label(" Large ").unwrap(), 2);
        assert!((catalog.net_pay(ml) - 154.0).abs() < 1e-9);

        assert!(matches!(
            catalog.parse_label("huge"),
            Err(PlannerError::UnknownShift { .. })
        ));
        assert!(catalog.parse_label("small+small+small").is_err());
        assert!(catalog.parse_label("").is_err());
    }

    #[test]
    fn test_match_net_pay() {
        let catalog = ShiftCatalog::standard();
        let id = catalog.match_net_pay(154.0, 1.0).unwrap();
        assert_eq!(catalog.combination(id).label, "medium+large");
        assert_eq!(catalog.match_net_pay(86.0, 1.0), Some(2));
        assert_eq!(catalog.match_net_pay(200.0, 1.0), None);
    }

    #[test]
    fn test_custom_catalog_ranks_by_net_pay() {
        let catalog = ShiftCatalog::new(vec![
            ShiftType::new("night", 120.0, 100.0),
            ShiftType::new("morning", 50.0, 40.0),
            ShiftType::new("evening", 80.0, 70.0),
        ])
        .unwrap();

        assert_eq!(catalog.shift_type(ShiftTier::Small).name, "morning");
        assert_eq!(catalog.shift_type(ShiftTier::Large).name, "night");
        assert!((catalog.large_net() - 100.0).abs() < 1e-9);
        assert_eq!(
            catalog.combination(catalog.parse_label("night+morning").unwrap()).label,
            "morning+night"
        );
    }

    #[test]
    fn test_custom_catalog_rejects_bad_input() {
        assert!(ShiftCatalog::new(vec![ShiftType::new("a", 1.0, 1.0)]).is_err());
        assert!(ShiftCatalog::new(vec![
            ShiftType::new("a", 1.0, 1.0),
            ShiftType::new("A", 2.0, 2.0),
            ShiftType::new("b", 3.0, 3.0),
        ])
        .is_err());
        assert!(ShiftCatalog::new(vec![
            ShiftType::new("a+b", 1.0, 1.0),
            ShiftType::new("c", 2.0, 2.0),
            ShiftType::new("d", 3.0, 3.0),
        ])
        .is_err());
    }
}
