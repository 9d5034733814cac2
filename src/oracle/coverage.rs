//! Coverage table and payout arithmetic.

use crate::record::{MinimalHealthRecord, TestResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tests younger than this earn the recency bonus.
pub const RECENT_TEST_WINDOW_DAYS: i64 = 30;

/// Multiplier applied to coverage for recent tests.
pub const RECENT_TEST_MULTIPLIER: f64 = 1.10;

/// Rejection reason for diseases missing from the table.
pub const REASON_NOT_COVERED: &str = "Disease not covered by insurance policy";

/// Rejection reason for results the rule does not accept.
pub const REASON_NOT_QUALIFYING: &str = "Test result does not qualify for coverage";

/// Coverage terms for one disease.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageRule {
    /// Only positive results are paid.
    pub requires_positive: bool,
    /// Base payout before the recency bonus.
    pub base_amount: f64,
}

impl CoverageRule {
    const fn positive(base_amount: f64) -> Self {
        Self {
            requires_positive: true,
            base_amount,
        }
    }
}

/// Outcome of looking a record up in the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eligibility {
    /// Covered with this base amount.
    Eligible {
        /// Base payout.
        base_amount: f64,
    },
    /// The disease is not in the table.
    NotCovered,
    /// The disease is covered but the result is not.
    ResultNotQualifying,
}

impl Eligibility {
    /// Rejection reason, if any.
    #[must_use]
    pub const fn rejection_reason(&self) -> Option<&'static str> {
        match self {
            Self::Eligible { .. } => None,
            Self::NotCovered => Some(REASON_NOT_COVERED),
            Self::ResultNotQualifying => Some(REASON_NOT_QUALIFYING),
        }
    }
}

/// Disease name to coverage rule.
///
/// Deserializes from a TOML table keyed by disease name:
///
/// ```toml
/// [coverage."COVID-19"]
/// requires_positive = true
/// base_amount = 500.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageTable {
    rules: BTreeMap<String, CoverageRule>,
}

impl CoverageTable {
    /// An empty table; every claim is rejected as not covered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Add or replace the rule for `disease`.
    #[must_use]
    pub fn with_rule(mut self, disease: impl Into<String>, rule: CoverageRule) -> Self {
        self.rules.insert(disease.into(), rule);
        self
    }

    /// Rule for `disease`. Names compare case-insensitively.
    #[must_use]
    pub fn rule_for(&self, disease: &str) -> Option<&CoverageRule> {
        let disease = disease.trim();
        self.rules.get(disease).or_else(|| {
            self.rules
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(disease))
                .map(|(_, rule)| rule)
        })
    }

    /// Decide whether `record` is covered.
    #[must_use]
    pub fn assess(&self, record: &MinimalHealthRecord) -> Eligibility {
        match self.rule_for(&record.disease) {
            None => Eligibility::NotCovered,
            Some(rule) if rule.requires_positive && record.result != TestResult::Positive => {
                Eligibility::ResultNotQualifying
            }
            Some(rule) => Eligibility::Eligible {
                base_amount: rule.base_amount,
            },
        }
    }

    /// Rules by disease name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CoverageRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for CoverageTable {
    fn default() -> Self {
        Self::empty()
            .with_rule("COVID-19", CoverageRule::positive(500.0))
            .with_rule("Influenza", CoverageRule::positive(200.0))
            .with_rule("Malaria", CoverageRule::positive(350.0))
            .with_rule("Tuberculosis", CoverageRule::positive(1000.0))
            .with_rule("Dengue", CoverageRule::positive(400.0))
            .with_rule(
                "Annual Checkup",
                CoverageRule {
                    requires_positive: false,
                    base_amount: 100.0,
                },
            )
    }
}

/// Round half away from zero to two decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Payout for `coverage` given how old the test is.
#[must_use]
pub fn payment_amount(coverage: f64, test_age: Duration) -> f64 {
    if test_age < Duration::days(RECENT_TEST_WINDOW_DAYS) {
        round2(coverage * RECENT_TEST_MULTIPLIER)
    } else {
        round2(coverage)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::did::Did;
    use chrono::Utc;
    use proptest::prelude::*;

    fn minimal(disease: &str, result: TestResult) -> MinimalHealthRecord {
        MinimalHealthRecord {
            disease: disease.to_string(),
            result,
            timestamp: Utc::now(),
            patient_did: Did::parse(
                "did:solana:devnet:9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
            )
            .expect("valid"),
        }
    }

    #[test]
    fn test_covid_positive_is_eligible_for_500() {
        let table = CoverageTable::default();
        assert_eq!(
            table.assess(&minimal("COVID-19", TestResult::Positive)),
            Eligibility::Eligible { base_amount: 500.0 }
        );
    }

    #[test]
    fn test_covid_negative_does_not_qualify() {
        let outcome = CoverageTable::default().assess(&minimal("COVID-19", TestResult::Negative));
        assert_eq!(outcome, Eligibility::ResultNotQualifying);
        assert!(outcome
            .rejection_reason()
            .is_some_and(|r| r.contains("does not qualify")));
    }

    #[test]
    fn test_unknown_disease_not_covered() {
        let outcome = CoverageTable::default().assess(&minimal("Common Cold", TestResult::Positive));
        assert_eq!(outcome.rejection_reason(), Some(REASON_NOT_COVERED));
    }

    #[test]
    fn test_checkup_accepts_any_result() {
        let table = CoverageTable::default();
        for result in [
            TestResult::Positive,
            TestResult::Negative,
            TestResult::Inconclusive,
        ] {
            assert_eq!(
                table.assess(&minimal("Annual Checkup", result)),
                Eligibility::Eligible { base_amount: 100.0 }
            );
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        let table = CoverageTable::default();
        assert!(table.rule_for("covid-19").is_some());
        assert!(table.rule_for(" Malaria ").is_some());
    }

    #[test]
    fn test_default_table() {
        let table = CoverageTable::default();
        assert_eq!(table.len(), 6);
        assert_eq!(
            table.rule_for("Tuberculosis").map(|r| r.base_amount),
            Some(1000.0)
        );
    }

    #[test]
    fn test_recency_bonus_boundary() {
        assert!((payment_amount(500.0, Duration::days(29)) - 550.0).abs() < 1e-9);
        assert!((payment_amount(500.0, Duration::days(30)) - 500.0).abs() < 1e-9);
        assert!((payment_amount(200.0, Duration::hours(1)) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_table_from_toml() {
        let table: CoverageTable = toml::from_str(
            r#"
            ["Lyme Disease"]
            requires_positive = true
            base_amount = 750.0
            "#,
        )
        .expect("table parses");
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.rule_for("Lyme Disease").map(|r| r.base_amount),
            Some(750.0)
        );
    }

    proptest! {
        #[test]
        fn prop_recent_payment_is_rounded_bonus(cents in 0u64..100_000_000, days in 0i64..30) {
            let coverage = cents as f64 / 100.0;
            let paid = payment_amount(coverage, Duration::days(days));
            prop_assert!((paid - round2(coverage * 1.10)).abs() < 1e-9);
        }

        #[test]
        fn prop_old_payment_is_rounded_coverage(coverage in 0.0f64..1_000_000.0, days in 30i64..3650) {
            let paid = payment_amount(coverage, Duration::days(days));
            prop_assert!((paid - round2(coverage)).abs() < 1e-9);
        }

        #[test]
        fn prop_round2_has_two_decimals(value in 0.0f64..1_000_000.0) {
            let rounded = round2(value);
            prop_assert!((rounded * 100.0 - (rounded * 100.0).round()).abs() < 1e-6);
            prop_assert!((rounded - value).abs() <= 0.005 + 1e-9);
        }
    }
}
