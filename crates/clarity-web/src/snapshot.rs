//! Serializable views of one session's screens.
//!
//! A view is built at the end of every request from the session slots. For
//! the finance screen, [`FinanceView::render`] applies any staged refinement
//! before it reads a single context field, so staged numbers are never
//! shadowed by the values they replace.

use clarity_rs::finance::{BudgetAdjustment, PlanReply, format_monthly};
use clarity_rs::prompt::FinanceContext;
use clarity_rs::resolver::{ModuleRecord, ResolveError, Resolver};
use clarity_rs::session::{AuditSession, FinanceSession};
use serde::Serialize;

/// What the audit screen shows above the note field.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHeader {
    pub id: u32,
    pub label: String,
    pub title: String,
    pub objective: String,
    pub audit_context: String,
    /// Suggested note field height, in pixels.
    pub preferred_height: u32,
}

impl ModuleHeader {
    fn from_record(record: &ModuleRecord, label: &str) -> Self {
        Self {
            id: record.id,
            label: label.to_string(),
            title: record.title.clone(),
            objective: record.objective.clone(),
            audit_context: record.audit_context.clone(),
            preferred_height: record.preferred_height,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditView {
    pub module: ModuleHeader,
    pub note: String,
    pub result: Option<String>,
    /// Inline error from the last action, if any.
    pub error: Option<String>,
}

impl AuditView {
    /// Reload the selected module and project the session.
    pub fn render(
        session: &AuditSession,
        resolver: &Resolver,
        error: Option<String>,
    ) -> Result<Self, ResolveError> {
        let record = resolver.load_module(session.selected_module_id)?;
        Ok(Self {
            module: ModuleHeader::from_record(&record, &session.selected_module_label),
            note: session.note.clone(),
            result: session.result.clone(),
            error,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct FinanceView {
    pub note: String,
    pub context: FinanceContext,
    pub expenses: Option<f64>,
    pub plan: Option<PlanReply>,
    /// Budget adjustments after the savings guardrail.
    pub budget_adjustments: Vec<BudgetAdjustment>,
    /// Context worth asking for; empty means no hint.
    pub missing_context: Vec<&'static str>,
    pub net_available: Option<f64>,
    /// `net_available` formatted as `$1,234/mo`.
    pub net_available_display: Option<String>,
    /// Stored plan pretty-printed, when requested.
    pub raw_json: Option<String>,
    pub error: Option<String>,
}

impl FinanceView {
    /// Apply any staged refinement, then project the session.
    pub fn render(session: &mut FinanceSession, raw: bool, error: Option<String>) -> Self {
        session.apply_pending();

        let net_available = session.net_available();
        Self {
            note: session.note.clone(),
            context: session.context.clone(),
            expenses: session.expenses,
            plan: session.plan.clone(),
            budget_adjustments: session
                .visible_budget_adjustments()
                .into_iter()
                .cloned()
                .collect(),
            missing_context: session.missing_context(),
            net_available,
            net_available_display: net_available.map(format_monthly),
            raw_json: if raw {
                session.plan.as_ref().map(PlanReply::to_pretty_json)
            } else {
                None
            },
            error,
        }
    }
}
