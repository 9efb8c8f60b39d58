//! Version services and version-file patching.
//!
//! A version service resolves `project.version` at configuration load; a
//! build step then stamps that version (and the rest of the build context)
//! into declared version files. Every patch leaves a `.orig` backup and the
//! always-run reset restores the original bytes, so a failed build never
//! leaves stamped files behind.

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

use crate::config::{Phase, ProjectConfig};
use crate::env::EnvOverlay;
use crate::error::{Error, Result};
use crate::expand::{scalar_text, Expander};
use crate::step::StepContext;
use crate::utils::io;

pub const HELM_CHART_FILE: &str = "Chart.yaml";
pub const HELM_VALUES_FILE: &str = "values.yaml";

// === Version services ===

/// Resolve the project version according to the configured service.
///
/// Returns `Ok(None)` when the document's own value stands (the default
/// `vjer` service). An unknown service type is fatal before any step runs.
pub fn service_version(
    service: &Value,
    env: &EnvOverlay,
    project_root: &Path,
) -> Result<Option<String>> {
    let Some(service_type) = service.get("type").and_then(Value::as_str) else {
        return Err(Error::config_invalid_value(
            "project.version_service",
            "the version service requires a type",
        ));
    };
    match service_type {
        "vjer" => Ok(None),
        "environment" => {
            let Some(variable) = service.get("variable").and_then(Value::as_str) else {
                return Err(Error::config_invalid_value(
                    "project.version_service.variable",
                    "the environment service requires a variable name",
                ));
            };
            let Some(value) = env.get(variable) else {
                return Err(Error::config_invalid_value(
                    "project.version_service",
                    format!("environment variable {variable} is not set"),
                ));
            };
            Ok(Some(value.trim_end_matches('.').to_string()))
        }
        "semver" => {
            let Some(value) = service.get("value").and_then(scalar_text) else {
                return Err(Error::config_invalid_value(
                    "project.version_service.value",
                    "the semver service requires a value",
                ));
            };
            Ok(Some(value))
        }
        "bumpver" => bumpver_version(project_root).map(Some),
        other => Err(Error::unknown_version_service(other)),
    }
}

/// The bump tool keeps the current version in `pyproject.toml`.
fn bumpver_version(project_root: &Path) -> Result<String> {
    let path = project_root.join("pyproject.toml");
    if !path.is_file() {
        return Err(Error::config_invalid_value(
            "project.version_service",
            format!("{} not found", path.display()),
        ));
    }
    let text = io::read_file(&path, "read bump tool configuration")?;
    let doc: toml::Value =
        toml::from_str(&text).map_err(|e| Error::config_invalid_value("pyproject.toml", e))?;
    doc.get("tool")
        .and_then(|v| v.get("bumpver"))
        .and_then(|v| v.get("current_version"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::config_invalid_value("pyproject.toml", "missing tool.bumpver.current_version")
        })
}

/// Increment the final dot-separated component. The version string is
/// otherwise treated as opaque text.
pub fn bump_last_component(version: &str) -> Result<String> {
    let (head, last) = match version.rfind('.') {
        Some(idx) => (&version[..=idx], &version[idx + 1..]),
        None => ("", version),
    };
    let number: u64 = last.parse().map_err(|_| {
        Error::config_invalid_value(
            "project.version",
            format!("cannot increment non-numeric component '{last}'"),
        )
    })?;
    Ok(format!("{head}{}", number + 1))
}

// === Version files ===

/// Patch (or restore, with `reset`) the step's version files.
///
/// The file list is the step's `version_files` (falling back to the build
/// section's), plus the chart metadata files for helm steps when present.
/// Helm steps resolve files under the chart root, everything else under
/// the project root. Patching backs each file up to `<file>.orig` and
/// expands `{var:name}` placeholders from the project and build sections
/// and the step's own fields; `Chart.yaml` additionally gets its `version`
/// (and optionally `appVersion`) set outright. Reset removes the patched
/// file and renames the backup into place.
pub fn update_version_files(
    config: &ProjectConfig,
    step: &StepContext,
    reset: bool,
) -> Result<()> {
    for path in version_file_list(config, step)? {
        if reset {
            restore_file(&path)?;
        } else {
            patch_file(config, step, &path)?;
        }
    }
    Ok(())
}

fn version_file_list(config: &ProjectConfig, step: &StepContext) -> Result<Vec<PathBuf>> {
    let base = if step.step_type == "helm" {
        config.chart_root_dir()?
    } else {
        config.project_root().to_path_buf()
    };

    let declared = match step.truthy_field("version_files") {
        Some(value) => value.clone(),
        None => config.get(Phase::Build, "version_files")?,
    };
    let Value::Array(names) = declared else {
        return Err(Error::config_invalid_value(
            "version_files",
            "expected a list of file names",
        ));
    };

    let mut files = Vec::new();
    for name in &names {
        let Some(name) = name.as_str() else {
            return Err(Error::config_invalid_value(
                "version_files",
                "expected a list of file names",
            ));
        };
        files.push(base.join(name));
    }

    if step.step_type == "helm" {
        for name in [HELM_CHART_FILE, HELM_VALUES_FILE] {
            let path = base.join(name);
            if (path.is_file() || orig_path(&path).is_file()) && !files.contains(&path) {
                files.push(path);
            }
        }
    }
    Ok(files)
}

fn patch_file(config: &ProjectConfig, step: &StepContext, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::config_invalid_value(
            "version_files",
            format!("{} does not exist", path.display()),
        ));
    }
    make_writable(path)?;
    std::fs::copy(path, orig_path(path))?;

    let content = io::read_file(path, "read version file")?;
    let expander = Expander::new(config.env())
        .with_source(config.section(Phase::Project))
        .with_source(config.section(Phase::Build))
        .with_source(step.fields());
    let mut expanded = expander.expand_str(&content);
    if path.file_name().and_then(|n| n.to_str()) == Some(HELM_CHART_FILE) {
        expanded = set_chart_versions(&expanded, config, step)?;
    }
    io::write_file(path, &expanded, "write version file")
}

fn set_chart_versions(content: &str, config: &ProjectConfig, step: &StepContext) -> Result<String> {
    let mut chart: Value =
        serde_yml::from_str(content).map_err(|e| Error::yaml("parse Chart.yaml", e))?;
    let Some(entries) = chart.as_object_mut() else {
        return Err(Error::yaml("parse Chart.yaml", "expected a mapping"));
    };
    let version = config.version()?;
    entries.insert("version".to_string(), json!(version));
    if step.field_flag("set_app_version") {
        entries.insert("appVersion".to_string(), json!(config.version()?));
    }
    serde_yml::to_string(&chart).map_err(|e| Error::yaml("serialize Chart.yaml", e))
}

fn restore_file(path: &Path) -> Result<()> {
    let orig = orig_path(path);
    if !orig.is_file() {
        return Ok(());
    }
    if path.is_file() {
        std::fs::remove_file(path)?;
    }
    std::fs::rename(&orig, path)?;
    Ok(())
}

fn orig_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.orig"))
}

fn make_writable(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    if permissions.readonly() {
        permissions.set_readonly(false);
        std::fs::set_permissions(path, permissions)?;
    }
    Ok(())
}
