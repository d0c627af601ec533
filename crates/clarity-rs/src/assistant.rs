//! The run flows behind each screen's primary action.
//!
//! Each assistant borrows the shared client and resolver, reads its inputs
//! from the session, and writes the outcome back only after every fallible
//! step has succeeded. On error the session is exactly as it was before the
//! call.

use tracing::{info, warn};

use crate::finance::{PlanReply, interpret_reply};
use crate::prompt::{self, FinancePrompts, TemplateError, UnresolvedPrompt};
use crate::resolver::{ResolveError, Resolver};
use crate::session::{AuditSession, FinanceSession};
use crate::{AzureChatClient, ChatError, ChatRequest};

/// Sampling temperature for finance plans.
pub const FINANCE_TEMPERATURE: f32 = 0.2;
/// Completion cap for finance plans.
pub const FINANCE_MAX_TOKENS: u32 = 900;

/// Failure of a run. The session is unchanged whenever this is returned.
#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    UnresolvedPrompt(#[from] UnresolvedPrompt),
    #[error("Error calling Azure OpenAI: {0}")]
    Chat(#[from] ChatError),
}

impl AssistantError {
    /// Resolution failures are a missing-content problem, not a transient
    /// one; hosts may surface them differently from remote-call errors.
    pub fn is_resolution(&self) -> bool {
        matches!(self, AssistantError::Resolve(_))
    }
}

/// Reviews audit notes against the selected module.
pub struct AuditAssistant<'a> {
    client: &'a AzureChatClient,
    resolver: &'a Resolver,
}

impl<'a> AuditAssistant<'a> {
    pub fn new(client: &'a AzureChatClient, resolver: &'a Resolver) -> Self {
        Self { client, resolver }
    }

    /// Review the session's note. Returns `Ok(false)` without calling the
    /// model when the note is blank.
    pub async fn run(&self, session: &mut AuditSession) -> Result<bool, AssistantError> {
        if session.note.trim().is_empty() {
            return Ok(false);
        }

        let module = self.resolver.load_module(session.selected_module_id)?;
        let messages = prompt::build_messages(&module, &session.note);

        let completion = self
            .client
            .chat(&ChatRequest::new(messages))
            .await
            .inspect_err(|e| warn!("Audit review failed: {e}"))?;

        info!(
            "Audit review complete: module={} ({}), {} chars",
            module.id,
            module.title,
            completion.content.len()
        );
        session.result = Some(completion.content);
        Ok(true)
    }
}

/// Turns messy money notes into a structured plan.
pub struct FinanceAssistant<'a> {
    client: &'a AzureChatClient,
    resolver: &'a Resolver,
}

impl<'a> FinanceAssistant<'a> {
    pub fn new(client: &'a AzureChatClient, resolver: &'a Resolver) -> Self {
        Self { client, resolver }
    }

    /// Produce a plan for the session's note and context. Returns
    /// `Ok(false)` without calling the model when the note is blank.
    pub async fn run(&self, session: &mut FinanceSession) -> Result<bool, AssistantError> {
        if session.note.trim().is_empty() {
            return Ok(false);
        }

        let prompts = FinancePrompts::load(self.resolver)?;
        let messages = prompts.messages(&session.note, &session.context)?;
        prompt::ensure_resolved(&messages)?;

        let request = ChatRequest::new(messages)
            .with_temperature(FINANCE_TEMPERATURE)
            .with_max_tokens(FINANCE_MAX_TOKENS);
        let completion = self
            .client
            .chat(&request)
            .await
            .inspect_err(|e| warn!("Finance plan request failed: {e}"))?;

        let reply = interpret_reply(&completion.content);
        match &reply {
            PlanReply::Plan(plan) => info!(
                "Finance plan ready: {} actions, {} budget adjustments",
                plan.actions.len(),
                plan.budget_adjustments.len()
            ),
            PlanReply::Degenerate { issues, .. } => {
                info!("Finance reply stored as raw text ({} issues)", issues.len())
            }
        }
        session.plan = Some(reply);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClarityConfig;
    use std::fs;

    fn unreachable_client() -> AzureChatClient {
        let config = ClarityConfig::from_lookup(|key| {
            let value = match key {
                "AZURE_OPENAI_ENDPOINT" => "http://127.0.0.1:1",
                "AZURE_OPENAI_KEY" => "test-key",
                "AZURE_OPENAI_API_VERSION" => "2024-06-01",
                "AZURE_OPENAI_DEPLOYMENT" => "gpt-4o",
                _ => return None,
            };
            Some(value.to_string())
        })
        .unwrap();
        AzureChatClient::new(&config).unwrap()
    }

    fn fixture() -> (tempfile::TempDir, Resolver) {
        let dir = tempfile::tempdir().unwrap();
        let modules = dir.path().join("modules");
        let clarifier = dir.path().join("prompts/finance/clarifier");
        fs::create_dir_all(&modules).unwrap();
        fs::create_dir_all(&clarifier).unwrap();
        fs::write(modules.join("module6.yaml"), "title: General Note Review\n").unwrap();
        fs::write(clarifier.join("system.md"), "You are a planner.").unwrap();
        fs::write(clarifier.join("developer.md"), "Reply in JSON.").unwrap();
        fs::write(clarifier.join("user.tmpl.md"), "Note: {user_text}").unwrap();
        let resolver = Resolver::new(modules, dir.path().join("prompts"));
        (dir, resolver)
    }

    #[tokio::test]
    async fn blank_notes_do_not_call_the_model() {
        let (_dir, resolver) = fixture();
        let client = unreachable_client();

        let mut audit = AuditSession::default();
        audit.set_note("   ");
        assert!(!AuditAssistant::new(&client, &resolver).run(&mut audit).await.unwrap());

        let mut finance = FinanceSession::default();
        assert!(!FinanceAssistant::new(&client, &resolver).run(&mut finance).await.unwrap());
    }

    #[tokio::test]
    async fn network_failure_leaves_audit_session_untouched() {
        let (_dir, resolver) = fixture();
        let client = unreachable_client();

        let mut session = AuditSession::default();
        session.set_note("Donated services were received.");
        session.result = Some("previous review".into());
        let before = session.clone();

        let err = AuditAssistant::new(&client, &resolver)
            .run(&mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::Chat(ChatError::Request(_))));
        assert!(!err.is_resolution());
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn network_failure_leaves_finance_session_untouched() {
        let (_dir, resolver) = fixture();
        let client = unreachable_client();

        let mut session = FinanceSession::default();
        session.set_note("Need to cover a $600 car repair.");
        session.plan = Some(interpret_reply("earlier raw reply"));
        let before = session.clone();

        let err = FinanceAssistant::new(&client, &resolver)
            .run(&mut session)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Error calling Azure OpenAI:"));
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn missing_module_is_a_resolution_error() {
        let (_dir, resolver) = fixture();
        let client = unreachable_client();

        let mut session = AuditSession::default();
        session.select_module("Grant Disclosures").unwrap();
        session.set_note("Grant revenue was recognized.");

        let err = AuditAssistant::new(&client, &resolver)
            .run(&mut session)
            .await
            .unwrap_err();
        assert!(err.is_resolution());
        assert!(err.to_string().contains("'5'"));
        assert!(session.result.is_none());
    }

    #[tokio::test]
    async fn leaked_prompt_id_is_caught_before_sending() {
        let (dir, resolver) = fixture();
        fs::write(
            dir.path().join("prompts/finance/clarifier/developer.md"),
            "See prompts.finance.clarifier.system",
        )
        .unwrap();
        let client = unreachable_client();

        let mut session = FinanceSession::default();
        session.apply_demo();
        let err = FinanceAssistant::new(&client, &resolver)
            .run(&mut session)
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::UnresolvedPrompt(_)));
        assert!(session.plan.is_none());
    }
}
