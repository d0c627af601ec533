//! Finance plan schema, validation and reply interpretation.
//!
//! The model is asked to answer with a JSON [`FinancePlan`]. The reply is
//! parsed and checked against the plan's generated JSON Schema before it is
//! stored. Anything that does not pass becomes a [`PlanReply::Degenerate`]
//! that keeps the raw text, so the user always sees something.

use std::fmt;

use schemars::JsonSchema;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::json_schema_for;

/// Summary used for replies that could not be read as a plan.
pub const PARSE_ISSUE_SUMMARY: &str = "Parse issue";

// ── Schema ─────────────────────────────────────────────────────────

/// Structured plan returned by the finance clarifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FinancePlan {
    pub summary: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub budget_adjustments: Vec<BudgetAdjustment>,
    #[serde(default)]
    pub risks_or_considerations: Vec<String>,
    #[serde(default)]
    pub clarifying_questions: Vec<String>,
    pub tone: String,
}

/// One numbered step of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    #[serde(deserialize_with = "whole_number")]
    #[schemars(with = "i64")]
    pub step: i64,
    pub title: String,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BudgetAdjustment {
    pub category: String,
    pub change: String,
    pub period: String,
    pub rationale: String,
}

/// Accept `2` and `2.0` alike. Fractional or out-of-range numbers fail.
fn whole_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(n) = number.as_i64() {
        return Ok(n);
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Ok(f as i64)
        }
        _ => Err(de::Error::custom(format!(
            "expected a whole number, got {number}"
        ))),
    }
}

// ── Validation ─────────────────────────────────────────────────────

/// A single offending field, named by dotted path (`actions.0.step`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Aggregate validation failure listing every violation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("finance plan failed validation: {}", join_violations(.violations))]
pub struct PlanValidationError {
    pub violations: Vec<FieldViolation>,
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convert a JSON pointer (`/actions/0/step`) to a dotted field name.
fn dotted_field(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Check a parsed reply against the plan schema.
///
/// All-or-nothing: either every field is well-formed and a plan is returned,
/// or the error lists every violation found.
pub fn validate(value: &Value) -> Result<FinancePlan, PlanValidationError> {
    let schema = json_schema_for::<FinancePlan>();
    let validator = jsonschema::validator_for(&schema).map_err(|e| PlanValidationError {
        violations: vec![FieldViolation {
            field: "$schema".into(),
            message: e.to_string(),
        }],
    })?;

    let violations: Vec<FieldViolation> = validator
        .iter_errors(value)
        .map(|e| {
            let mut field = dotted_field(e.instance_path().as_str());
            if let jsonschema::error::ValidationErrorKind::Required { property } = e.kind() {
                let name = property.as_str().map_or_else(|| property.to_string(), str::to_string);
                field = if field.is_empty() {
                    name
                } else {
                    format!("{field}.{name}")
                };
            }
            if field.is_empty() {
                field = "$".into();
            }
            FieldViolation {
                field,
                message: e.to_string(),
            }
        })
        .collect();

    if !violations.is_empty() {
        return Err(PlanValidationError { violations });
    }

    // Shapes the schema accepts but serde cannot hold (e.g. a step of 1e30).
    serde_json::from_value(value.clone()).map_err(|e| PlanValidationError {
        violations: vec![FieldViolation {
            field: "$".into(),
            message: e.to_string(),
        }],
    })
}

// ── Reply interpretation ───────────────────────────────────────────

/// What gets stored after a finance run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanReply {
    Plan(FinancePlan),
    /// The reply was not JSON, or was JSON that failed validation.
    Degenerate {
        summary: String,
        raw: String,
        issues: Vec<FieldViolation>,
    },
}

impl PlanReply {
    fn degenerate(raw: &str, issues: Vec<FieldViolation>) -> Self {
        PlanReply::Degenerate {
            summary: PARSE_ISSUE_SUMMARY.to_string(),
            raw: raw.to_string(),
            issues,
        }
    }

    pub fn summary(&self) -> &str {
        match self {
            PlanReply::Plan(plan) => &plan.summary,
            PlanReply::Degenerate { summary, .. } => summary,
        }
    }

    pub fn plan(&self) -> Option<&FinancePlan> {
        match self {
            PlanReply::Plan(plan) => Some(plan),
            PlanReply::Degenerate { .. } => None,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        matches!(self, PlanReply::Degenerate { .. })
    }

    /// Pretty JSON for the "show raw" toggle.
    pub fn to_pretty_json(&self) -> String {
        let value = match self {
            PlanReply::Plan(plan) => serde_json::to_value(plan),
            PlanReply::Degenerate { summary, raw, .. } => {
                Ok(serde_json::json!({ "summary": summary, "raw": raw }))
            }
        };
        value
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_default()
    }
}

/// Turn raw model output into a stored reply. Never fails.
pub fn interpret_reply(raw: &str) -> PlanReply {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Finance reply is not JSON ({e}); keeping raw text");
            return PlanReply::degenerate(raw, Vec::new());
        }
    };

    match validate(&value) {
        Ok(plan) => PlanReply::Plan(plan),
        Err(err) => {
            warn!("{err}");
            PlanReply::degenerate(raw, err.violations)
        }
    }
}

// ── View helpers ───────────────────────────────────────────────────

/// Budget adjustments to show. Savings adjustments are hidden until the user
/// has given either a savings goal or an income.
pub fn visible_budget_adjustments<'a>(
    plan: &'a FinancePlan,
    goals: &str,
    income: &str,
) -> Vec<&'a BudgetAdjustment> {
    let has_baseline = !goals.trim().is_empty() || !income.trim().is_empty();
    plan.budget_adjustments
        .iter()
        .filter(|b| has_baseline || !b.category.trim().eq_ignore_ascii_case("savings"))
        .collect()
}

/// Context still worth asking for, in display order.
pub fn missing_context(income: &str, expenses: Option<f64>, goals: &str) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if income.trim().is_empty() {
        missing.push("monthly income");
    }
    if expenses.is_none() {
        missing.push("monthly expenses (estimate)");
    }
    if goals.trim().is_empty() {
        missing.push("savings baseline/target");
    }
    missing
}

/// Monthly income minus expenses, when the income reads as a number.
pub fn net_available(income: &str, expenses: Option<f64>) -> Option<f64> {
    let cleaned: String = income
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '$')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let income: f64 = cleaned.parse().ok()?;
    income
        .is_finite()
        .then(|| income - expenses.unwrap_or(0.0))
}

/// Format a monthly amount as whole dollars with thousands separators.
pub fn format_monthly(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if rounded < 0.0 { "-" } else { "" };
    format!("${sign}{grouped}/mo")
}
