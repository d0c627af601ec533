//! Per-session context objects.
//!
//! A host keeps one [`Session`] per user and passes the relevant half to
//! every operation that reads or writes persisted fields. Nothing here talks
//! to the network or the filesystem; the assistants in [`crate::assistant`]
//! do that and write results back only on success.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::finance::{self, BudgetAdjustment, PlanReply};
use crate::prompt::FinanceContext;
use crate::resolver::ModuleRecord;

/// Note used by the audit demo when a module has no sample.
pub const AUDIT_DEMO_FALLBACK: &str = "The Organization received various donated services \
during the year, which may or may not be recognized in the financial statements.";

/// Note used by the finance demo.
pub const FINANCE_DEMO_NOTE: &str =
    "I want to save more but my credit card balance keeps growing. Maybe cut dining? Not sure.";

/// Generate a unique session ID.
pub fn generate_session_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("ss-{ts:x}-{count:04x}")
}

// ── Module catalog ─────────────────────────────────────────────────

/// One entry of the audit module picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModuleOption {
    pub label: &'static str,
    pub icon: &'static str,
    pub id: u32,
}

/// Picker entries in display order. The first is the default selection.
pub const MODULE_OPTIONS: [ModuleOption; 6] = [
    ModuleOption {
        label: "General Note Review",
        icon: "✏️",
        id: 6,
    },
    ModuleOption {
        label: "Donated Services",
        icon: "🎁",
        id: 1,
    },
    ModuleOption {
        label: "Multi-Year Pledges",
        icon: "📅",
        id: 2,
    },
    ModuleOption {
        label: "Expense Allocations",
        icon: "📊",
        id: 3,
    },
    ModuleOption {
        label: "Net Asset Restrictions",
        icon: "🔒",
        id: 4,
    },
    ModuleOption {
        label: "Grant Disclosures",
        icon: "📄",
        id: 5,
    },
];

pub fn module_by_label(label: &str) -> Option<&'static ModuleOption> {
    MODULE_OPTIONS.iter().find(|m| m.label == label)
}

pub fn module_by_id(id: u32) -> Option<&'static ModuleOption> {
    MODULE_OPTIONS.iter().find(|m| m.id == id)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module '{0}'")]
pub struct UnknownModule(pub String);

// ── Sessions ───────────────────────────────────────────────────────

/// Everything one user's session persists across requests.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub audit: AuditSession,
    pub finance: FinanceSession,
}

/// Audit screen state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditSession {
    pub note: String,
    pub result: Option<String>,
    pub selected_module_id: u32,
    pub selected_module_label: String,
}

impl Default for AuditSession {
    fn default() -> Self {
        let default = &MODULE_OPTIONS[0];
        Self {
            note: String::new(),
            result: None,
            selected_module_id: default.id,
            selected_module_label: default.label.to_string(),
        }
    }
}

impl AuditSession {
    /// Switch modules by picker label. Switching clears the note and result;
    /// re-selecting the current module changes nothing.
    pub fn select_module(&mut self, label: &str) -> Result<&'static ModuleOption, UnknownModule> {
        let option = module_by_label(label).ok_or_else(|| UnknownModule(label.to_string()))?;
        if option.id != self.selected_module_id {
            self.selected_module_id = option.id;
            self.selected_module_label = option.label.to_string();
            self.note.clear();
            self.result = None;
        }
        Ok(option)
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    /// Fill the note with the module's sample (or the generic fallback).
    pub fn apply_demo(&mut self, module: &ModuleRecord) {
        let sample = module.sample_note.trim();
        self.note = if sample.is_empty() {
            AUDIT_DEMO_FALLBACK.to_string()
        } else {
            sample.to_string()
        };
        self.result = None;
    }

    pub fn reset(&mut self) {
        self.note.clear();
        self.result = None;
    }
}

/// Numbers and notes staged from the refinement form, applied at the start
/// of the next render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Refinement {
    #[serde(default)]
    pub income: Option<String>,
    #[serde(default)]
    pub expenses: Option<f64>,
    #[serde(default)]
    pub goals: Option<String>,
    #[serde(default)]
    pub constraints: Option<String>,
}

/// Finance screen state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinanceSession {
    pub note: String,
    pub plan: Option<PlanReply>,
    pub context: FinanceContext,
    /// Monthly expense estimate. Only the refinement form sets it.
    pub expenses: Option<f64>,
    pub pending: Option<Refinement>,
}

impl FinanceSession {
    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = note.into();
    }

    pub fn set_context(&mut self, context: FinanceContext) {
        self.context = context;
    }

    pub fn apply_demo(&mut self) {
        self.note = FINANCE_DEMO_NOTE.to_string();
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn stage_refinement(&mut self, refinement: Refinement) {
        self.pending = Some(refinement);
    }

    /// Move staged values into the context. Text values apply only when
    /// non-empty; expenses apply whenever present. Returns whether anything
    /// was pending.
    pub fn apply_pending(&mut self) -> bool {
        let Some(pending) = self.pending.take() else {
            return false;
        };

        fn non_empty(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        if let Some(income) = non_empty(pending.income) {
            self.context.income = income;
        }
        if let Some(expenses) = pending.expenses {
            self.expenses = Some(expenses);
        }
        if let Some(goals) = non_empty(pending.goals) {
            self.context.goals = goals;
        }
        if let Some(constraints) = non_empty(pending.constraints) {
            self.context.constraints = constraints;
        }
        true
    }

    /// Budget adjustments to display for the stored plan.
    pub fn visible_budget_adjustments(&self) -> Vec<&BudgetAdjustment> {
        match self.plan.as_ref().and_then(PlanReply::plan) {
            Some(plan) => finance::visible_budget_adjustments(
                plan,
                &self.context.goals,
                &self.context.income,
            ),
            None => Vec::new(),
        }
    }

    pub fn missing_context(&self) -> Vec<&'static str> {
        finance::missing_context(&self.context.income, self.expenses, &self.context.goals)
    }

    pub fn net_available(&self) -> Option<f64> {
        finance::net_available(&self.context.income, self.expenses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::interpret_reply;

    fn module_with_sample(sample: &str) -> ModuleRecord {
        ModuleRecord {
            id: 1,
            title: "Donated Services".into(),
            objective: String::new(),
            audit_context: String::new(),
            sample_note: sample.into(),
            preferred_height: 175,
            checks: vec![],
            guidance: String::new(),
            gaap_refs: vec![],
        }
    }

    #[test]
    fn session_id_unique() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("ss-"));
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(MODULE_OPTIONS[0].id, 6);
        assert_eq!(module_by_label("Grant Disclosures").map(|m| m.id), Some(5));
        assert_eq!(module_by_id(2).map(|m| m.label), Some("Multi-Year Pledges"));
        assert!(module_by_label("Payroll").is_none());
    }

    #[test]
    fn audit_defaults_to_general_review() {
        let session = AuditSession::default();
        assert_eq!(session.selected_module_id, 6);
        assert_eq!(session.selected_module_label, "General Note Review");
        assert!(session.note.is_empty());
        assert!(session.result.is_none());
    }

    #[test]
    fn switching_module_clears_note_and_result() {
        let mut session = AuditSession::default();
        session.set_note("draft");
        session.result = Some("review".into());

        session.select_module("General Note Review").unwrap();
        assert_eq!(session.note, "draft");

        let option = session.select_module("Donated Services").unwrap();
        assert_eq!(option.id, 1);
        assert_eq!(session.selected_module_id, 1);
        assert!(session.note.is_empty());
        assert!(session.result.is_none());
    }

    #[test]
    fn unknown_module_leaves_selection() {
        let mut session = AuditSession::default();
        session.set_note("keep");
        let err = session.select_module("Payroll").unwrap_err();
        assert_eq!(err.to_string(), "unknown module 'Payroll'");
        assert_eq!(session.selected_module_id, 6);
        assert_eq!(session.note, "keep");
    }

    #[test]
    fn audit_demo_prefers_module_sample() {
        let mut session = AuditSession::default();
        session.result = Some("old".into());
        session.apply_demo(&module_with_sample("  Volunteers built a playground.\n"));
        assert_eq!(session.note, "Volunteers built a playground.");
        assert!(session.result.is_none());

        session.apply_demo(&module_with_sample("   "));
        assert_eq!(session.note, AUDIT_DEMO_FALLBACK);
    }

    #[test]
    fn finance_reset_clears_everything() {
        let mut session = FinanceSession::default();
        session.apply_demo();
        session.plan = Some(interpret_reply("not json"));
        session.context.income = "5200".into();
        session.expenses = Some(3000.0);
        session.stage_refinement(Refinement::default());

        session.reset();
        assert_eq!(session, FinanceSession::default());
    }

    #[test]
    fn pending_refinement_applies_non_empty_values_once() {
        let mut session = FinanceSession::default();
        session.context.goals = "$5k EF by Dec".into();
        session.context.debts = "Card A $3.2k".into();
        session.stage_refinement(Refinement {
            income: Some(" 5,200 ".into()),
            expenses: Some(3100.0),
            goals: Some("   ".into()),
            constraints: None,
        });

        assert!(session.apply_pending());
        assert_eq!(session.context.income, "5,200");
        assert_eq!(session.expenses, Some(3100.0));
        assert_eq!(session.context.goals, "$5k EF by Dec");
        assert_eq!(session.context.debts, "Card A $3.2k");
        assert!(session.pending.is_none());

        assert!(!session.apply_pending());
    }

    #[test]
    fn finance_view_helpers_follow_context() {
        let mut session = FinanceSession::default();
        session.plan = Some(interpret_reply(
            r#"{"summary":"s","tone":"t","budget_adjustments":[
                {"category":"savings","change":"+50","period":"monthly","rationale":"buffer"}]}"#,
        ));
        assert!(session.visible_budget_adjustments().is_empty());
        assert_eq!(session.missing_context().len(), 3);
        assert_eq!(session.net_available(), None);

        session.stage_refinement(Refinement {
            income: Some("$4,000".into()),
            expenses: Some(2500.0),
            ..Default::default()
        });
        session.apply_pending();
        assert_eq!(session.visible_budget_adjustments().len(), 1);
        assert_eq!(session.missing_context(), vec!["savings baseline/target"]);
        assert_eq!(session.net_available(), Some(1500.0));
    }
}
