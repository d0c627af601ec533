//! Run the clarity assistants from the command line.
//!
//! Reads Azure OpenAI settings from the environment (or a `.env` file).
//!
//! # Examples
//!
//! ```sh
//! # List audit modules
//! clarity modules
//!
//! # Print a prompt fragment or a normalized module
//! clarity resolve prompts.finance.clarifier.system
//! clarity resolve 1
//!
//! # Review an audit note against Donated Services
//! clarity audit --module 1 --note "Volunteers helped with the gala."
//!
//! # Turn a messy money note into a plan
//! echo "Car repair due, still want to save" | clarity finance --stdin --income 5200
//! ```

use clap::{Args, Parser, Subcommand};
use clarity_rs::config::{self, ClarityConfig};
use clarity_rs::finance::{PlanReply, format_monthly};
use clarity_rs::prelude::*;
use clarity_rs::session::module_by_id;
use std::io::{self, Read};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "clarity", version, about = "Clarity assistants for audit and money notes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the audit module catalog
    Modules,

    /// Resolve a numeric module id or a dotted prompt path
    Resolve {
        /// e.g. `6` or `prompts.finance.clarifier.system`
        identifier: String,
    },

    /// Review an audit note against one module
    Audit {
        /// Numeric module id
        #[arg(long, default_value_t = 6)]
        module: u32,

        #[command(flatten)]
        input: NoteInput,
    },

    /// Clarify a financial note into a structured plan
    Finance {
        #[command(flatten)]
        input: NoteInput,

        /// Monthly income
        #[arg(long, default_value = "")]
        income: String,

        /// Savings goals
        #[arg(long, default_value = "")]
        goals: String,

        /// Debt summary
        #[arg(long, default_value = "")]
        debts: String,

        /// Time horizon
        #[arg(long, default_value = "")]
        horizon: String,

        /// Constraints
        #[arg(long, default_value = "")]
        constraints: String,

        /// Monthly expenses estimate
        #[arg(long)]
        expenses: Option<f64>,

        /// Print the stored plan as JSON
        #[arg(long)]
        raw: bool,
    },

    /// Print the finance plan JSON Schema
    Schema,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct NoteInput {
    /// Note text
    #[arg(long)]
    note: Option<String>,

    /// Read the note from stdin
    #[arg(long)]
    stdin: bool,

    /// Use the demo note
    #[arg(long)]
    demo: bool,
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

/// The note from `--note` or `--stdin`; `None` means `--demo`.
fn read_note(input: &NoteInput) -> Result<Option<String>, String> {
    if input.demo {
        return Ok(None);
    }
    match (&input.note, input.stdin) {
        (Some(note), _) => Ok(Some(note.clone())),
        (None, true) => read_stdin_content().map(Some),
        (None, false) => Err("provide --note, --stdin, or --demo".to_string()),
    }
}

fn load_runtime() -> Result<(AzureChatClient, Resolver), String> {
    let config = ClarityConfig::from_env().map_err(|e| e.to_string())?;
    let client = AzureChatClient::new(&config).map_err(|e| e.to_string())?;
    let resolver = Resolver::new(&config.modules_dir, &config.prompts_dir);
    Ok((client, resolver))
}

fn local_resolver() -> Resolver {
    let (modules_dir, prompts_dir) = config::data_dirs_from_env();
    Resolver::new(modules_dir, prompts_dir)
}

fn render_plan(session: &FinanceSession) -> String {
    let Some(reply) = &session.plan else {
        return String::new();
    };
    let plan = match reply {
        PlanReply::Plan(plan) => plan,
        PlanReply::Degenerate { summary, raw, issues } => {
            let mut out = format!("Summary\n  {summary}\n\n{raw}\n");
            if !issues.is_empty() {
                out.push_str("\nIssues\n");
                for issue in issues {
                    out.push_str(&format!("  - {issue}\n"));
                }
            }
            return out;
        }
    };

    let mut out = format!("Summary\n  {}\n", plan.summary);
    let lists = [
        ("Risks / Considerations", &plan.risks_or_considerations),
        ("Clarifying Questions", &plan.clarifying_questions),
    ];
    for (heading, items) in lists {
        if !items.is_empty() {
            out.push_str(&format!("\n{heading}\n"));
            for item in items {
                out.push_str(&format!("  - {item}\n"));
            }
        }
    }

    out.push_str("\nActions\n");
    if plan.actions.is_empty() {
        out.push_str("  No actions returned. Try adding more context or --demo.\n");
    }
    for action in &plan.actions {
        out.push_str(&format!("  {}. {}\n", action.step, action.title.trim()));
        let tags: Vec<String> = [
            action.topic.as_deref().map(|t| format!("#{t}")),
            action.priority.as_deref().map(|p| format!("Priority: {p}")),
            action.due_date.as_deref().map(|d| format!("Due: {d}")),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !tags.is_empty() {
            out.push_str(&format!("     [{}]\n", tags.join("] [")));
        }
        if !action.details.trim().is_empty() {
            out.push_str(&format!("     {}\n", action.details.trim()));
        }
    }

    let adjustments = session.visible_budget_adjustments();
    if !adjustments.is_empty() {
        out.push_str("\nBudget Adjustments\n");
        for b in adjustments {
            out.push_str(&format!(
                "  - {}: {} ({}): {}\n",
                b.category, b.change, b.period, b.rationale
            ));
        }
    }

    let missing = session.missing_context();
    if !missing.is_empty() {
        out.push_str(&format!(
            "\nTo get more concrete actions, add: {}.\n",
            missing.join(", ")
        ));
    }
    if let Some(net) = session.net_available() {
        out.push_str(&format!(
            "Estimated net available: {} (before debt paydown/savings)\n",
            format_monthly(net)
        ));
    }
    out
}

// ── Commands ───────────────────────────────────────────────────────

async fn run(cli: Cli) -> Result<String, String> {
    match cli.command {
        Command::Modules => Ok(MODULE_OPTIONS
            .iter()
            .map(|m| format!("{:>2}  {} {}\n", m.id, m.icon, m.label))
            .collect()),

        Command::Resolve { identifier } => {
            match local_resolver()
                .resolve_str(&identifier)
                .map_err(|e| e.to_string())?
            {
                Resolved::Module(record) => serde_json::to_string_pretty(&record)
                    .map(|s| s + "\n")
                    .map_err(|e| format!("failed to serialize module: {e}")),
                Resolved::Prompt(text) => Ok(text),
            }
        }

        Command::Schema => serde_json::to_string_pretty(&json_schema_for::<FinancePlan>())
            .map(|s| s + "\n")
            .map_err(|e| format!("failed to serialize schema: {e}")),

        Command::Audit { module, input } => {
            let note = read_note(&input)?;
            let (client, resolver) = load_runtime()?;

            let mut session = AuditSession {
                selected_module_id: module,
                selected_module_label: module_by_id(module)
                    .map(|m| m.label.to_string())
                    .unwrap_or_else(|| format!("Module {module}")),
                ..Default::default()
            };
            match note {
                Some(note) => session.set_note(note),
                None => {
                    let record = resolver.load_module(module).map_err(|e| e.to_string())?;
                    session.apply_demo(&record);
                }
            }

            let ran = AuditAssistant::new(&client, &resolver)
                .run(&mut session)
                .await
                .map_err(|e| e.to_string())?;
            if !ran {
                return Err("note is empty".to_string());
            }
            Ok(session.result.unwrap_or_default() + "\n")
        }

        Command::Finance {
            input,
            income,
            goals,
            debts,
            horizon,
            constraints,
            expenses,
            raw,
        } => {
            let note = read_note(&input)?;
            let (client, resolver) = load_runtime()?;

            let mut session = FinanceSession::default();
            match note {
                Some(note) => session.set_note(note),
                None => session.apply_demo(),
            }
            session.set_context(FinanceContext {
                income,
                goals,
                debts,
                time_horizon: horizon,
                constraints,
            });
            session.stage_refinement(Refinement {
                expenses,
                ..Default::default()
            });
            session.apply_pending();

            let ran = FinanceAssistant::new(&client, &resolver)
                .run(&mut session)
                .await
                .map_err(|e| e.to_string())?;
            if !ran {
                return Err("note is empty".to_string());
            }

            match (&session.plan, raw) {
                (Some(reply), true) => Ok(reply.to_pretty_json() + "\n"),
                _ => Ok(render_plan(&session)),
            }
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
