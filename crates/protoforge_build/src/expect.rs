//! Checking a build against the project's expectation manifest.

use std::fmt;

use protoforge_config::Expectation;

use crate::scheduler::BuildReport;

/// An `[[expect]]` entry the build did not meet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationFailure {
    /// The unit.
    pub unit: String,
    /// Expected number of compiled files.
    pub expected: usize,
    /// Actual number, `None` when the unit did not resolve or was not built.
    pub actual: Option<usize>,
}

impl fmt::Display for ExpectationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) => write!(
                f,
                "unit '{}' compiled {actual} files, expected {}",
                self.unit, self.expected
            ),
            None => write!(
                f,
                "unit '{}' did not resolve, expected {} compiled files",
                self.unit, self.expected
            ),
        }
    }
}

/// Compares each expectation's compiled-file count with the report.
pub fn check_expectations(
    expectations: &[Expectation],
    report: &BuildReport,
) -> Vec<ExpectationFailure> {
    expectations
        .iter()
        .filter_map(|expectation| {
            let actual = report
                .unit(&expectation.unit)
                .and_then(|u| u.compiled_count());
            (actual != Some(expectation.compiled)).then(|| ExpectationFailure {
                unit: expectation.unit.clone(),
                expected: expectation.compiled,
                actual,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::UnitReport;
    use crate::UnitError;
    use std::path::PathBuf;

    fn report() -> BuildReport {
        let mut report = BuildReport::default();
        report.units.insert(
            "main".to_string(),
            UnitReport {
                unit: "main".to_string(),
                resolved: true,
                include_roots: vec![PathBuf::from("/p/src/main/proto")],
                compiled_files: (0..11)
                    .map(|i| PathBuf::from(format!("/p/src/main/proto/m{i}.proto")))
                    .collect(),
                outcome: Ok(None),
            },
        );
        report.units.insert(
            "broken".to_string(),
            UnitReport {
                unit: "broken".to_string(),
                resolved: false,
                include_roots: vec![],
                compiled_files: vec![],
                outcome: Err(UnitError::Cancelled {
                    unit: "broken".to_string(),
                }),
            },
        );
        report
    }

    fn expect(unit: &str, compiled: usize) -> Expectation {
        Expectation {
            unit: unit.to_string(),
            compiled,
        }
    }

    #[test]
    fn met_expectation_passes() {
        assert!(check_expectations(&[expect("main", 11)], &report()).is_empty());
    }

    #[test]
    fn wrong_count_fails() {
        let failures = check_expectations(&[expect("main", 10)], &report());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].actual, Some(11));
        assert_eq!(
            failures[0].to_string(),
            "unit 'main' compiled 11 files, expected 10"
        );
    }

    #[test]
    fn unresolved_unit_fails() {
        let failures = check_expectations(&[expect("broken", 0), expect("absent", 1)], &report());
        assert_eq!(failures.len(), 2);
        assert!(failures.iter().all(|f| f.actual.is_none()));
    }
}
