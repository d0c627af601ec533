//! The modules and prompts shipped at the workspace root load and render.

use std::path::PathBuf;

use clarity_rs::finance::validate;
use clarity_rs::prompt::{FinanceContext, FinancePrompts, build_messages, ensure_resolved};
use clarity_rs::resolver::Resolver;
use clarity_rs::session::MODULE_OPTIONS;

fn workspace_resolver() -> Resolver {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
    Resolver::new(root.join("modules"), root.join("prompts"))
}

#[test]
fn every_catalog_module_loads() {
    let resolver = workspace_resolver();
    for option in &MODULE_OPTIONS {
        let record = resolver
            .load_module(option.id)
            .unwrap_or_else(|e| panic!("module {} ({}): {e}", option.id, option.label));
        assert_eq!(record.id, option.id);
        assert_eq!(record.title, option.label);
        assert!(!record.sample_note.trim().is_empty(), "{} has no sample", option.label);

        let messages = build_messages(&record, &record.sample_note);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains(&record.title));
    }
}

#[test]
fn general_review_uses_built_in_checks() {
    let record = workspace_resolver().load_module(6).unwrap();
    assert!(record.checks.is_empty());
    assert!(record.gaap_refs.is_empty());

    let messages = build_messages(&record, "Some note.");
    assert!(messages[0].content.contains("- Identify vague or ambiguous language"));
}

#[test]
fn finance_prompts_resolve_and_render() {
    let prompts = FinancePrompts::load(&workspace_resolver()).unwrap();
    let context = FinanceContext {
        income: "$5,200".into(),
        ..Default::default()
    };
    let messages = prompts.messages("Cut dining?", &context).unwrap();
    ensure_resolved(&messages).unwrap();

    let user = &messages[2].content;
    assert!(user.contains("Cut dining?"));
    assert!(user.contains("Monthly income: $5,200"));
    assert!(user.contains("Goals: TBD"));
    assert!(user.contains("Constraints: None"));
    assert!(user.contains(r#"{"summary": "...", "tone": "..."}"#));
    assert!(!user.contains("{income}"));
}

#[test]
fn developer_prompt_example_matches_plan_shape() {
    let plan = serde_json::json!({
        "summary": "Stop the balance from growing.",
        "actions": [{"step": 1, "title": "Cap dining", "details": "$150/mo", "priority": "high"}],
        "budget_adjustments": [
            {"category": "Dining", "change": "-$100", "period": "monthly", "rationale": "flexible"}
        ],
        "risks_or_considerations": [],
        "clarifying_questions": ["What is your income?"],
        "tone": "supportive"
    });
    let parsed = validate(&plan).unwrap();
    assert_eq!(parsed.actions[0].priority.as_deref(), Some("high"));
}
