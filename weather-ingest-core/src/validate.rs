//! Data contract for archive responses.
//!
//! Validation is a two-stage parse. [`structure`] decodes the untyped payload
//! into typed fields, then [`rules`] runs independent invariant checks:
//!
//! 1. structure: required fields present, series homogeneous
//! 2. every series (including `time`) has the same length
//! 3. per-value plausibility ranges, only when 2 holds
//! 4. envelope: coordinates in bounds, timezone is `GMT`
//!
//! All violations are collected. A model is produced only when there are none.

use log::{error, info};
use serde::Serialize;

use crate::model::{RawObservationPayload, ValidatedObservationSet};

mod rules;
mod structure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Dotted path into the payload, e.g. `hourly.temperature_2m`.
    pub field: String,
    pub reason: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Non-empty list of contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.field.as_str())
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} contract violation(s)", self.violations.len())?;
        for (i, v) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

pub fn validate(raw: &RawObservationPayload) -> Result<ValidatedObservationSet, ValidationReport> {
    let mut violations = Vec::new();

    let decoded = structure::decode(raw, &mut violations);
    if rules::check_lengths(&decoded, &mut violations) {
        rules::check_ranges(&decoded, &mut violations);
    }
    rules::check_envelope(&decoded, &mut violations);

    if violations.is_empty() {
        if let Some(model) = decoded.into_model() {
            info!("Validated {} data points", model.hourly.len());
            return Ok(model);
        }
        // Unreachable while every missing field pushes a violation.
        violations.push(Violation::new("$", "incomplete payload"));
    }

    error!("Data contract violation ({} issue(s))", violations.len());
    for v in &violations {
        error!("   Field '{}': {}", v.field, v.reason);
    }
    Err(ValidationReport { violations })
}
