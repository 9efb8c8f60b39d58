//! Deploy phase handlers.

use serde_json::Value;

use crate::collab::ChartRepo;
use crate::error::{Error, Result};
use crate::log_status;
use crate::step::{is_truthy, StepContext, StepExec};
use crate::utils::artifact;

use super::{chart_name, helm_args, helm_package_path, release_name, resolve_dir};

fn has_version_arg(step: &StepContext) -> bool {
    matches!(step.truthy_field("helm_args"), Some(Value::Object(args)) if args.contains_key("version"))
}

/// Upgrade the release from the chart repository, or from the locally
/// packaged chart when the step sets `remote: false`.
pub fn helm(ctx: &mut StepExec) -> Result<()> {
    let chart = chart_name(ctx.config, &ctx.step)?;
    let release = release_name(ctx.config, &ctx.step)?;
    let mut args = helm_args(ctx.config, &ctx.step)?;
    let remote = ctx.step.field("remote").map(is_truthy).unwrap_or(true);

    let chart_ref = if remote {
        let repo_value = ctx.lookup("chart_repo")?;
        let repo = ChartRepo::resolve(&repo_value, ctx.collab.charts.as_ref())?;
        if !has_version_arg(&ctx.step) {
            args.push("--version".to_string());
            args.push(ctx.config.version()?);
        }
        if repo.repo_type != "oci" {
            ctx.collab.charts.repo_update()?;
        }
        repo.chart_ref(&chart)
    } else {
        helm_package_path(ctx.config, &ctx.step)?.display().to_string()
    };

    log_status!("Deploying {} as release {}", chart_ref, release);
    ctx.collab.charts.upgrade(&release, &chart_ref, &args)
}

/// Copy files from the artifact directory to the target directory,
/// honoring `clean` and each entry's `overwrite` flag.
pub fn filecopy(ctx: &mut StepExec) -> Result<()> {
    let target = ctx.step.field_str("target").ok_or_else(|| {
        Error::config_invalid_value("target", "filecopy steps require a target directory")
    })?;
    let target_root = resolve_dir(ctx.config.project_root(), &target);
    if ctx.step.field_flag("clean") && target_root.exists() {
        log_status!("Removing {}", target_root.display());
        artifact::remove_path(&target_root)?;
    }
    std::fs::create_dir_all(&target_root)?;

    let entries = match ctx.step.truthy_field("files") {
        None => return Ok(()),
        Some(Value::Array(entries)) => entries.clone(),
        Some(_) => {
            return Err(Error::config_invalid_value(
                "files",
                "expected a list of file mappings",
            ))
        }
    };
    let artifacts_dir = ctx.config.artifacts_dir()?;
    for entry in &entries {
        let Some(spec) = entry.as_object() else {
            return Err(Error::config_invalid_value(
                "files",
                "expected a list of file mappings",
            ));
        };
        let Some(name) = spec.get("name").and_then(Value::as_str) else {
            return Err(Error::config_invalid_value(
                "files",
                "each file entry requires a name",
            ));
        };
        let source = artifacts_dir.join(name);
        let base = source.file_name().ok_or_else(|| {
            Error::config_invalid_value("files", format!("invalid file name: {name}"))
        })?;
        let dest = match spec.get("target").and_then(Value::as_str) {
            Some(target) => target_root.join(target),
            None => target_root.join(base),
        };
        let overwrite = spec.get("overwrite").map(is_truthy).unwrap_or(true);
        if !overwrite && dest.exists() {
            continue;
        }
        log_status!("Copying {} to {}", source.display(), dest.display());
        artifact::copy_tree(&source, &dest)?;
    }
    Ok(())
}
