//! Step dispatch.
//!
//! Every step runs the same lifecycle: `pre`, `execute` (handler lookup by
//! phase and step type, then the handler body), `post`, and an
//! `always_post` that runs on every exit path. Handlers live in an explicit
//! registry; a step type with no registered handler is fatal to the phase.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::collab::{storage, Collaborators};
use crate::config::{Phase, ProjectConfig};
use crate::error::{Error, Result};
use crate::expand::scalar_text;
use crate::version;
use crate::log_status;
use crate::utils::artifact;

// === Step context ===

/// One declared step, materialized for the duration of its execution.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub step_type: String,
    pub name: Option<String>,
    pub ignore: bool,
    /// True only for the first non-skipped step of a phase; set by the
    /// action runner.
    pub is_first_step: bool,
    fields: Map<String, Value>,
}

impl StepContext {
    /// A step carrying nothing but its type. Fixed release slots with no
    /// declared configuration look like this.
    pub fn bare(step_type: &str) -> Self {
        Self {
            step_type: step_type.to_string(),
            name: None,
            ignore: false,
            is_first_step: false,
            fields: Map::new(),
        }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(entry) = value.as_object() else {
            return Err(Error::config_invalid_value(
                "steps",
                "each step must be a mapping",
            ));
        };
        let Some(step_type) = entry.get("type").and_then(Value::as_str) else {
            return Err(Error::config_invalid_value(
                "steps.type",
                "every step requires a type",
            ));
        };
        let name = entry.get("name").and_then(Value::as_str).map(str::to_string);
        let ignore = entry.get("ignore").and_then(Value::as_bool).unwrap_or(false);
        Ok(Self {
            step_type: step_type.to_string(),
            name,
            ignore,
            is_first_step: false,
            fields: entry.clone(),
        })
    }

    /// Display label: the declared name, or the type when unnamed.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.step_type)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A field that is present but falsy (null, false, empty string, zero,
    /// empty list or mapping) does not count; lookups that use this fall
    /// through to the project section.
    pub fn truthy_field(&self, key: &str) -> Option<&Value> {
        self.field(key).filter(|value| is_truthy(value))
    }

    pub fn field_str(&self, key: &str) -> Option<String> {
        self.truthy_field(key).and_then(scalar_text)
    }

    pub fn field_flag(&self, key: &str) -> bool {
        self.field(key).map(is_truthy).unwrap_or(false)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(entries) => !entries.is_empty(),
    }
}

// === Handler registry ===

pub trait StepHandler {
    fn run(&self, ctx: &mut StepExec) -> Result<()>;
}

impl<F> StepHandler for F
where
    F: Fn(&mut StepExec) -> Result<()>,
{
    fn run(&self, ctx: &mut StepExec) -> Result<()> {
        self(ctx)
    }
}

/// Explicit dispatch table keyed by `(phase, step type)`.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<(Phase, String), Box<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, phase: Phase, step_type: &str, handler: H)
    where
        H: StepHandler + 'static,
    {
        self.handlers
            .insert((phase, step_type.to_string()), Box::new(handler));
    }

    pub fn lookup(&self, phase: Phase, step_type: &str) -> Option<&dyn StepHandler> {
        self.handlers
            .get(&(phase, step_type.to_string()))
            .map(Box::as_ref)
    }
}

// === Execution ===

/// Everything a handler sees: the shared configuration, the collaborator
/// set, the phase namespace, and the step itself.
pub struct StepExec<'a> {
    pub config: &'a mut ProjectConfig,
    pub collab: &'a Collaborators,
    pub phase: Phase,
    pub step: StepContext,
    pub is_pre_release: bool,
}

impl StepExec<'_> {
    /// Two-tier field lookup: the step's own field when truthy, the
    /// project section otherwise.
    pub fn lookup(&self, key: &str) -> Result<Value> {
        if let Some(value) = self.step.truthy_field(key) {
            return Ok(value.clone());
        }
        self.config.get(Phase::Project, key)
    }

    pub fn lookup_str(&self, key: &str) -> Result<String> {
        let value = self.lookup(key)?;
        scalar_text(&value)
            .ok_or_else(|| Error::config_invalid_value(key, "expected a scalar value"))
    }
}

/// Run one step through the full lifecycle. `always_post` runs whether or
/// not the body succeeded; a body failure wins over a cleanup failure.
pub fn run_step(registry: &HandlerRegistry, ctx: &mut StepExec) -> Result<()> {
    let body = run_step_body(registry, ctx);
    let cleanup = always_post(ctx);
    body.and(cleanup)
}

fn run_step_body(registry: &HandlerRegistry, ctx: &mut StepExec) -> Result<()> {
    pre(ctx)?;
    let handler = registry
        .lookup(ctx.phase, &ctx.step.step_type)
        .ok_or_else(|| Error::unknown_handler(ctx.phase.as_str(), &ctx.step.step_type))?;
    handler.run(ctx)?;
    post(ctx)
}

fn pre(ctx: &mut StepExec) -> Result<()> {
    match ctx.phase {
        Phase::Build => {
            if ctx.step.is_first_step {
                log_status!("Preparing the artifact directory");
                let artifacts_dir = ctx.config.artifacts_dir()?;
                artifact::remove_path(&artifacts_dir)?;
                std::fs::create_dir_all(&artifacts_dir)?;
            }
            version::update_version_files(ctx.config, &ctx.step, false)
        }
        Phase::Test => {
            if ctx.step.is_first_step {
                let results_dir = ctx.config.test_results_dir()?;
                artifact::remove_path(&results_dir)?;
                std::fs::create_dir_all(&results_dir)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn post(ctx: &mut StepExec) -> Result<()> {
    match ctx.phase {
        Phase::Build => {
            if ctx.step.truthy_field("archive_artifacts").is_some() {
                archive_artifacts(ctx)?;
            }
            publish_artifacts(ctx)?;
            log_status!("Build step completed successfully");
            Ok(())
        }
        _ => Ok(()),
    }
}

fn always_post(ctx: &mut StepExec) -> Result<()> {
    match ctx.phase {
        Phase::Build => version::update_version_files(ctx.config, &ctx.step, true),
        _ => Ok(()),
    }
}

/// Replace each artifact subdirectory with a packed archive of itself.
/// A string value of `archive_artifacts` becomes a name suffix.
fn archive_artifacts(ctx: &StepExec) -> Result<()> {
    let artifacts_dir = ctx.config.artifacts_dir()?;
    let suffix = match ctx.step.truthy_field("archive_artifacts") {
        Some(Value::String(suffix)) => Some(suffix.clone()),
        _ => None,
    };
    for entry in std::fs::read_dir(&artifacts_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let archive_name = match &suffix {
            Some(suffix) => format!("{name}-{suffix}{}", storage::PKG_EXT),
            None => format!("{name}{}", storage::PKG_EXT),
        };
        log_status!("Archiving {} to {}", name, archive_name);
        artifact::pack(&path, &artifacts_dir.join(&archive_name))?;
        artifact::remove_path(&path)?;
    }
    Ok(())
}

/// Push the artifacts named by the step's `publish` list to remote
/// storage. Pre-release publishes tolerate an existing object.
fn publish_artifacts(ctx: &StepExec) -> Result<()> {
    let Some(Value::Array(entries)) = ctx.step.truthy_field("publish") else {
        return Ok(());
    };
    let entries = entries.clone();
    if ctx.config.env().is_set("NO_REMOTE_ARTIFACT_STORAGE") {
        log_status!("Remote artifact storage is disabled, not publishing");
        return Ok(());
    }
    let artifacts_dir = ctx.config.artifacts_dir()?;
    for entry in &entries {
        let Some(name) = scalar_text(entry) else {
            return Err(Error::config_invalid_value(
                "publish",
                "expected a list of artifact names",
            ));
        };
        log_status!("Publishing {}", name);
        storage::publish_package(
            ctx.collab.storage.as_ref(),
            &artifacts_dir.join(&name),
            &name,
            ctx.is_pre_release,
        )?;
    }
    Ok(())
}
