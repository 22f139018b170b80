//! Structured Feedback Module
//!
//! Machine-readable compile reports, printed under `--json`.

use serde::{Deserialize, Serialize};

use crate::utils::Error;

// ==================== Diagnostics ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Halts the whole run
    Fatal,
    /// Fails the unit it occurred in
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error code (e.g., "E0201")
    pub code: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn from_error(error: &Error) -> Self {
        Self {
            code: error.code().to_string(),
            severity: if error.is_fatal() { Severity::Fatal } else { Severity::Error },
            message: error.to_string(),
        }
    }
}

// ==================== Compile Report ====================

/// Outcome of one compilation unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    pub source: String,
    pub success: bool,
    /// Instructions in the emitted listing, labels not counted
    pub instruction_count: usize,
    /// Fully qualified names of the classes a class unit declared
    pub classes: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl UnitReport {
    pub fn success(source: String, instruction_count: usize, classes: Vec<String>) -> Self {
        Self {
            source,
            success: true,
            instruction_count,
            classes,
            diagnostics: vec![],
        }
    }

    pub fn failure(source: String, error: &Error) -> Self {
        Self {
            source,
            success: false,
            instruction_count: 0,
            classes: vec![],
            diagnostics: vec![Diagnostic::from_error(error)],
        }
    }
}

/// Everything a run of the compiler did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileReport {
    pub units: Vec<UnitReport>,
}

impl CompileReport {
    pub fn push(&mut self, unit: UnitReport) {
        self.units.push(unit);
    }

    pub fn success(&self) -> bool {
        self.units.iter().all(|u| u.success)
    }

    /// Output as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_failure_carries_code_and_severity() {
        let error = Error::UnresolvedClass {
            name: "Foo".to_string(),
        };
        let unit = UnitReport::failure("a.sl".to_string(), &error);
        assert_eq!(unit.diagnostics[0].code, "E0201");
        assert_eq!(unit.diagnostics[0].severity, Severity::Fatal);
        assert_eq!(unit.diagnostics[0].message, "Cannot resolve class: Foo");
    }

    #[test]
    fn test_report_json() {
        let mut report = CompileReport::default();
        report.push(UnitReport::success("a.sl".to_string(), 3, vec!["geo::Point".to_string()]));
        assert!(report.success());

        let value: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(value["units"][0]["instruction_count"], 3);
        assert_eq!(value["units"][0]["classes"][0], "geo::Point");

        report.push(UnitReport::failure(
            "b.sl".to_string(),
            &Error::MissingOperand { op: "+".to_string() },
        ));
        assert!(!report.success());
        let value: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(value["units"][1]["diagnostics"][0]["severity"], "error");
    }
}
