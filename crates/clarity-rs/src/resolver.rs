//! Module and prompt-fragment resolution.
//!
//! Two kinds of identifier share one entry point, [`Resolver::resolve`]:
//!
//! - A **numeric** id (`6`, `"6"`) names an audit module stored as
//!   `<modules_dir>/module<N>.yaml`. The YAML is parsed into a
//!   [`ModuleRecord`] with documented defaults for every absent key.
//! - A **dotted path** (`prompts.finance.clarifier.system`) names a prompt
//!   fragment under `<prompts_dir>`. A leading `prompts` segment is optional.
//!   The remaining segments become a relative path and the extensions in
//!   [`PROMPT_EXTENSIONS`] are tried in priority order. If nothing matches
//!   and the second-to-last segment is not a directory, the last two
//!   segments are retried as one dotted file stem, so
//!   `finance.clarifier.user.tmpl` finds `finance/clarifier/user.tmpl.md`.
//!   A missing `finance/clarifier/system.*` is reported as missing rather
//!   than answered by `finance/clarifier.system.*`.
//!
//! The identifier kind is decided once, by [`ModuleId::parse`], and never
//! re-inferred. Every call reads from disk; nothing is cached.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Extensions tried for dotted prompt paths, highest priority first.
pub const PROMPT_EXTENSIONS: [&str; 5] = ["md", "txt", "yaml", "yml", "json"];

/// Default `preferred_height` when a module omits it or gives 0.
pub const DEFAULT_PREFERRED_HEIGHT: u32 = 175;

const DEFAULT_OBJECTIVE: &str = "Clarify and strengthen the audit note.";
const DEFAULT_AUDIT_CONTEXT: &str = "General nonprofit audit context.";

// ── Errors ─────────────────────────────────────────────────────────

/// Failure to resolve a module or prompt identifier.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("module identifier is empty")]
    EmptyIdentifier,
    #[error("invalid module identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("not found: '{identifier}'. Tried: {}", format_tried(.tried))]
    NotFound {
        identifier: String,
        tried: Vec<PathBuf>,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl ResolveError {
    /// Whether this is a missing-file condition (as opposed to a bad file).
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound { .. })
    }
}

fn format_tried(tried: &[PathBuf]) -> String {
    tried
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Identifiers ────────────────────────────────────────────────────

/// A parsed module/prompt identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModuleId {
    /// Numbered audit module.
    Numeric(u32),
    /// Prompt fragment path segments, without the optional `prompts` prefix.
    Dotted(Vec<String>),
}

impl ModuleId {
    /// Classify a raw identifier. All-digit strings are numeric; everything
    /// else is a dotted path.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ResolveError::EmptyIdentifier);
        }

        if raw.bytes().all(|b| b.is_ascii_digit()) {
            return raw
                .parse::<u32>()
                .map(ModuleId::Numeric)
                .map_err(|_| ResolveError::InvalidIdentifier(raw.to_string()));
        }

        let mut segments: Vec<&str> = raw.split('.').collect();
        if segments.first() == Some(&"prompts") {
            segments.remove(0);
        }
        if segments.is_empty() {
            return Err(ResolveError::EmptyIdentifier);
        }
        // Segments become path components; keep them inside the prompt root.
        let valid = segments.iter().all(|s| {
            !s.is_empty() && !s.contains(['/', '\\']) && !s.chars().any(char::is_whitespace)
        });
        if !valid {
            return Err(ResolveError::InvalidIdentifier(raw.to_string()));
        }

        Ok(ModuleId::Dotted(
            segments.into_iter().map(str::to_string).collect(),
        ))
    }
}

impl FromStr for ModuleId {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleId::parse(s)
    }
}

impl From<u32> for ModuleId {
    fn from(id: u32) -> Self {
        ModuleId::Numeric(id)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleId::Numeric(id) => write!(f, "{id}"),
            ModuleId::Dotted(segments) => write!(f, "{}", segments.join(".")),
        }
    }
}

// ── Records ────────────────────────────────────────────────────────

/// A fully-defaulted audit module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: u32,
    pub title: String,
    pub objective: String,
    pub audit_context: String,
    pub sample_note: String,
    pub preferred_height: u32,
    pub checks: Vec<String>,
    pub guidance: String,
    pub gaap_refs: Vec<String>,
}

/// The on-disk shape: every key optional.
#[derive(Debug, Default, Deserialize)]
struct RawModule {
    title: Option<String>,
    objective: Option<String>,
    audit_context: Option<String>,
    sample_note: Option<String>,
    preferred_height: Option<u32>,
    checks: Option<Vec<String>>,
    guidance: Option<String>,
    gaap_refs: Option<Vec<String>>,
}

impl RawModule {
    /// Apply defaults for every absent key.
    fn normalize(self, id: u32) -> ModuleRecord {
        ModuleRecord {
            id,
            title: self.title.unwrap_or_else(|| format!("Module {id}")),
            objective: self
                .objective
                .unwrap_or_else(|| DEFAULT_OBJECTIVE.to_string()),
            audit_context: self
                .audit_context
                .unwrap_or_else(|| DEFAULT_AUDIT_CONTEXT.to_string()),
            sample_note: self.sample_note.unwrap_or_default(),
            preferred_height: self
                .preferred_height
                .filter(|h| *h > 0)
                .unwrap_or(DEFAULT_PREFERRED_HEIGHT),
            checks: self.checks.unwrap_or_default(),
            guidance: self.guidance.unwrap_or_default(),
            gaap_refs: self.gaap_refs.unwrap_or_default(),
        }
    }
}

/// Result of [`Resolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Module(ModuleRecord),
    Prompt(String),
}

// ── Resolver ───────────────────────────────────────────────────────

/// Reads modules and prompt fragments from two read-only roots.
#[derive(Debug, Clone)]
pub struct Resolver {
    modules_dir: PathBuf,
    prompts_dir: PathBuf,
}

impl Resolver {
    pub fn new(modules_dir: impl Into<PathBuf>, prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            modules_dir: modules_dir.into(),
            prompts_dir: prompts_dir.into(),
        }
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    pub fn prompts_dir(&self) -> &Path {
        &self.prompts_dir
    }

    /// Resolve a parsed identifier to a module record or prompt text.
    pub fn resolve(&self, id: &ModuleId) -> Result<Resolved, ResolveError> {
        match id {
            ModuleId::Numeric(n) => self.load_module(*n).map(Resolved::Module),
            ModuleId::Dotted(segments) => self.load_segments(segments).map(Resolved::Prompt),
        }
    }

    /// Parse and resolve a raw identifier string.
    pub fn resolve_str(&self, raw: &str) -> Result<Resolved, ResolveError> {
        self.resolve(&ModuleId::parse(raw)?)
    }

    /// Path of the YAML document for a numeric module.
    pub fn module_path(&self, id: u32) -> PathBuf {
        self.modules_dir.join(format!("module{id}.yaml"))
    }

    /// Load and normalize a numeric module.
    pub fn load_module(&self, id: u32) -> Result<ModuleRecord, ResolveError> {
        let path = self.module_path(id);
        if !path.is_file() {
            return Err(ResolveError::NotFound {
                identifier: id.to_string(),
                tried: vec![path],
            });
        }
        let text = read_text(&path)?;
        let raw = if is_blank_document(&text) {
            RawModule::default()
        } else {
            serde_yaml::from_str::<Option<RawModule>>(&text)
                .map_err(|source| ResolveError::Parse {
                    path: path.clone(),
                    source,
                })?
                .unwrap_or_default()
        };
        debug!("Loaded module {id} from {}", path.display());
        Ok(raw.normalize(id))
    }

    /// Load a prompt fragment by dotted path (with or without `prompts.`).
    pub fn load_prompt(&self, dotted: &str) -> Result<String, ResolveError> {
        match ModuleId::parse(dotted)? {
            ModuleId::Dotted(segments) => self.load_segments(&segments),
            ModuleId::Numeric(_) => Err(ResolveError::InvalidIdentifier(dotted.to_string())),
        }
    }

    fn load_segments(&self, segments: &[String]) -> Result<String, ResolveError> {
        let mut tried = Vec::new();

        let (stem, dirs) = split_last(segments);
        let dir = join_all(&self.prompts_dir, dirs);
        if let Some(text) = try_extensions(&dir, stem, &mut tried)? {
            return Ok(text);
        }

        // Dotted file stem, e.g. `user.tmpl` -> user.tmpl.md. Only when the
        // segment path has no directory to hold the plain stem.
        if segments.len() >= 2 && !dir.is_dir() {
            let (parents, pair) = segments.split_at(segments.len() - 2);
            let dotted_stem = pair.join(".");
            let dir = join_all(&self.prompts_dir, parents);
            if let Some(text) = try_extensions(&dir, &dotted_stem, &mut tried)? {
                return Ok(text);
            }
        }

        Err(ResolveError::NotFound {
            identifier: segments.join("."),
            tried,
        })
    }
}

fn split_last(segments: &[String]) -> (&str, &[String]) {
    match segments.split_last() {
        Some((last, rest)) => (last.as_str(), rest),
        None => ("", segments),
    }
}

fn join_all(root: &Path, segments: &[String]) -> PathBuf {
    segments.iter().fold(root.to_path_buf(), |p, s| p.join(s))
}

/// Try `<dir>/<stem>.<ext>` for each extension in priority order, recording
/// every candidate in `tried`.
fn try_extensions(
    dir: &Path,
    stem: &str,
    tried: &mut Vec<PathBuf>,
) -> Result<Option<String>, ResolveError> {
    for ext in PROMPT_EXTENSIONS {
        let candidate = dir.join(format!("{stem}.{ext}"));
        if candidate.is_file() {
            debug!("Resolved prompt {}", candidate.display());
            return read_text(&candidate).map(Some);
        }
        tried.push(candidate);
    }
    Ok(None)
}

fn read_text(path: &Path) -> Result<String, ResolveError> {
    std::fs::read_to_string(path).map_err(|source| ResolveError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Blank or comment-only YAML carries no keys.
fn is_blank_document(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|l| l.is_empty() || l.starts_with('#') || l == "---")
}
