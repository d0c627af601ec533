//! Convenience re-exports for common `clarity-rs` types.
//!
//! ```ignore
//! use clarity_rs::prelude::*;
//! ```
//!
//! Covers what a host needs to run either tool end to end: configuration,
//! the client, the resolver, the two sessions and their assistants. View
//! helpers and template internals stay in their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{AzureChatClient, ChatError, ChatRequest, Message, MessageRole, json_schema_for};

// ── Configuration and lookup ────────────────────────────────────────
pub use crate::config::{ClarityConfig, ConfigError};
pub use crate::resolver::{ModuleId, ModuleRecord, ResolveError, Resolved, Resolver};

// ── Assembly and replies ────────────────────────────────────────────
pub use crate::finance::{FinancePlan, PlanReply, interpret_reply};
pub use crate::prompt::{FinanceContext, build_finance_messages, build_messages};

// ── Sessions and flows ──────────────────────────────────────────────
pub use crate::assistant::{AssistantError, AuditAssistant, FinanceAssistant};
pub use crate::session::{
    AuditSession, FinanceSession, MODULE_OPTIONS, ModuleOption, Refinement, Session,
};
