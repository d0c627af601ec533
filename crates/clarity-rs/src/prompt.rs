//! Chat message assembly.
//!
//! Both builders are pure: the same inputs always produce byte-identical
//! message lists.
//!
//! - [`build_messages`] turns a [`ModuleRecord`] and an audit note into a
//!   system/user pair. Empty `checks`, `guidance` and `gaap_refs` fall back
//!   to fixed default text.
//! - [`build_finance_messages`] combines the three finance prompt fragments
//!   with the note and a [`FinanceContext`]. Only the user template is
//!   rendered; the system and developer fragments are sent verbatim.

use serde::{Deserialize, Serialize};

use crate::Message;
use crate::resolver::{ModuleRecord, ResolveError, Resolver};

/// Used when a module lists no checks.
pub const DEFAULT_CHECKS: &str = "- Identify vague or ambiguous language\n\
- Provide precise, supportable alternatives\n\
- Flag missing or risky disclosures";

/// Used when a module has no guidance text.
pub const DEFAULT_GUIDANCE: &str = "Use plain, specific language; avoid boilerplate; \
include concrete amounts, dates, policies, restrictions, and constraints when known.";

/// Used when a module lists no GAAP references.
pub const DEFAULT_GAAP_REFS: &str = "- Use relevant GAAP guidance when applicable.";

/// Dotted ids of the three finance prompt fragments.
pub const FINANCE_SYSTEM_PROMPT: &str = "prompts.finance.clarifier.system";
pub const FINANCE_DEVELOPER_PROMPT: &str = "prompts.finance.clarifier.developer";
pub const FINANCE_USER_TEMPLATE: &str = "prompts.finance.clarifier.user.tmpl";

// ── Audit ──────────────────────────────────────────────────────────

/// Render each item as its own `- ` line. An empty list renders as "".
pub fn bulletize<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_default(block: String, default: &str) -> String {
    if block.is_empty() {
        default.to_string()
    } else {
        block
    }
}

/// Build the system/user message pair for one audit review.
pub fn build_messages(module: &ModuleRecord, note: &str) -> Vec<Message> {
    let checks = or_default(bulletize(&module.checks), DEFAULT_CHECKS);
    let guidance = or_default(module.guidance.clone(), DEFAULT_GUIDANCE);
    let refs = or_default(bulletize(&module.gaap_refs), DEFAULT_GAAP_REFS);

    let system = format!(
        "You are an expert nonprofit audit reviewer and technical writer.\n\
Your goal is to improve clarity, specificity, and GAAP-aligned disclosure quality.\n\
\n\
Module: {title}\n\
Objective: {objective}\n\
Audit Context: {context}\n\
\n\
Primary review checks:\n\
{checks}\n\
\n\
Additional guidance:\n\
{guidance}\n\
\n\
If GAAP references are relevant, consider:\n\
{refs}\n\
\n\
Output format:\n\
- Start with a concise summary of issues.\n\
- Provide improved wording (redlines or “before → after”).\n\
- Include clarifying questions to fill gaps.\n\
- Note risks or compliance considerations.\n\
- Keep recommendations specific and actionable.",
        title = module.title,
        objective = module.objective,
        context = module.audit_context,
    );

    let user = format!(
        "Audit note to review:\n---\n{}\n---\n\
Please apply the checks and return a reviewer-friendly output as described.\n",
        note.trim()
    );

    vec![Message::system(system.trim()), Message::user(user)]
}

// ── Finance ────────────────────────────────────────────────────────

/// Optional context the user supplies alongside a finance note.
///
/// Blank fields render as `TBD` (`None` for constraints).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinanceContext {
    pub income: String,
    pub goals: String,
    pub debts: String,
    pub time_horizon: String,
    pub constraints: String,
}

impl FinanceContext {
    fn value_or<'a>(value: &'a str, default: &'a str) -> &'a str {
        if value.trim().is_empty() {
            default
        } else {
            value
        }
    }

    fn placeholder<'a>(&'a self, note: &'a str, name: &str) -> Option<&'a str> {
        match name {
            "user_text" => Some(note.trim()),
            "income" => Some(Self::value_or(&self.income, "TBD")),
            "goals" => Some(Self::value_or(&self.goals, "TBD")),
            "debts" => Some(Self::value_or(&self.debts, "TBD")),
            "time_horizon" => Some(Self::value_or(&self.time_horizon, "TBD")),
            "constraints" => Some(Self::value_or(&self.constraints, "None")),
            _ => None,
        }
    }
}

/// The three finance prompt fragments, loaded fresh from disk.
#[derive(Debug, Clone)]
pub struct FinancePrompts {
    pub system: String,
    pub developer: String,
    pub user_template: String,
}

impl FinancePrompts {
    pub fn load(resolver: &Resolver) -> Result<Self, ResolveError> {
        Ok(Self {
            system: resolver.load_prompt(FINANCE_SYSTEM_PROMPT)?,
            developer: resolver.load_prompt(FINANCE_DEVELOPER_PROMPT)?,
            user_template: resolver.load_prompt(FINANCE_USER_TEMPLATE)?,
        })
    }

    pub fn messages(
        &self,
        note: &str,
        context: &FinanceContext,
    ) -> Result<Vec<Message>, TemplateError> {
        build_finance_messages(
            &self.system,
            &self.developer,
            &self.user_template,
            note,
            context,
        )
    }
}

/// Build the system, developer (second system) and user messages.
pub fn build_finance_messages(
    system: &str,
    developer: &str,
    user_template: &str,
    note: &str,
    context: &FinanceContext,
) -> Result<Vec<Message>, TemplateError> {
    let user = render_template(user_template, |name| context.placeholder(note, name))?;
    Ok(vec![
        Message::system(system),
        Message::system(developer),
        Message::user(user),
    ])
}

// ── Templates ──────────────────────────────────────────────────────

/// Failure rendering a `{name}` template.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template references unknown placeholder '{{{name}}}'")]
    UnknownPlaceholder { name: String },
    #[error("unbalanced '{brace}' at character {position} in template")]
    UnbalancedBrace { brace: char, position: usize },
}

/// Substitute `{name}` placeholders using `lookup`.
///
/// `{{` and `}}` render as literal braces. A format spec or conversion after
/// the name (`{income:>10}`, `{income!r}`) is accepted and ignored.
pub fn render_template<'a>(
    template: &str,
    lookup: impl Fn(&str) -> Option<&'a str>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().enumerate().peekable();

    while let Some((position, c)) = chars.next() {
        match c {
            '{' => {
                if chars.next_if(|&(_, n)| n == '{').is_some() {
                    out.push('{');
                    continue;
                }
                let mut field = String::new();
                let mut closed = false;
                for (_, n) in chars.by_ref() {
                    match n {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(TemplateError::UnbalancedBrace { brace: '{', position }),
                        _ => field.push(n),
                    }
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBrace { brace: '{', position });
                }
                let name = field
                    .split([':', '!'])
                    .next()
                    .unwrap_or_default()
                    .trim();
                let value = lookup(name).ok_or_else(|| TemplateError::UnknownPlaceholder {
                    name: name.to_string(),
                })?;
                out.push_str(value);
            }
            '}' => {
                if chars.next_if(|&(_, n)| n == '}').is_none() {
                    return Err(TemplateError::UnbalancedBrace { brace: '}', position });
                }
                out.push('}');
            }
            _ => out.push(c),
        }
    }

    Ok(out)
}

// ── Diagnostics ────────────────────────────────────────────────────

/// A dotted prompt id leaked into an outgoing message unresolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("found dotted path literal inside prompts/messages: '{0}'")]
pub struct UnresolvedPrompt(pub &'static str);

/// Reject message lists that still carry a literal finance prompt id.
pub fn ensure_resolved(messages: &[Message]) -> Result<(), UnresolvedPrompt> {
    let ids = [
        FINANCE_SYSTEM_PROMPT,
        FINANCE_DEVELOPER_PROMPT,
        FINANCE_USER_TEMPLATE,
    ];
    for message in messages {
        if let Some(id) = ids.iter().find(|id| message.content.contains(*id)) {
            return Err(UnresolvedPrompt(*id));
        }
    }
    Ok(())
}
