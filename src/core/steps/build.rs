//! Build phase handlers.

use std::path::PathBuf;

use serde_json::Value;

use crate::config::Phase;
use crate::env::EnvOverlay;
use crate::error::{Error, Result};
use crate::expand::scalar_text;
use crate::log_status;
use crate::step::{is_truthy, StepExec};
use crate::utils::{artifact, command};

use super::{docker_init, resolve_dir, tagged_name};

/// Pushing is controlled by `VJER_DOCKER_PUSH`; without it, every run
/// except a local one pushes.
fn push_enabled(env: &EnvOverlay) -> bool {
    if let Some(flag) = env.get("VJER_DOCKER_PUSH") {
        return matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
    }
    env.get_or("VJER_ENV", "local") != "local"
}

/// Build the image and push it to the container registry.
pub fn docker(ctx: &mut StepExec) -> Result<()> {
    let image = docker_init(ctx.config, &ctx.step, ctx.is_pre_release)?;
    let dockerfile = ctx.lookup_str("dockerfile")?;
    log_status!("Building docker image: {}", image.image_tag);

    let mut args = vec![
        "build".to_string(),
        "--pull".to_string(),
        "--rm".to_string(),
        "--file".to_string(),
        dockerfile,
        "--tag".to_string(),
        image.image_tag.clone(),
        "--build-arg".to_string(),
        format!("VERSION={}", ctx.config.version()?),
        "--build-arg".to_string(),
        format!("BUILD_VERSION={}", ctx.config.get_str(Phase::Build, "build_version")?),
    ];
    if let Some(Value::Object(extra)) = ctx.step.truthy_field("build_args") {
        for (key, value) in extra {
            let text = scalar_text(value).ok_or_else(|| {
                Error::config_invalid_value("build_args", "expected scalar values")
            })?;
            args.push("--build-arg".to_string());
            args.push(format!("{key}={text}"));
        }
    }
    args.push(".".to_string());
    command::run_streamed(
        ctx.config.project_root(),
        "docker",
        &args,
        ctx.config.env(),
        "docker build",
    )?;

    if push_enabled(ctx.config.env()) && image.registry_type != "local" {
        log_status!("Pushing image to registry");
        ctx.collab.registry.push(&image.image_tag)?;
    }
    Ok(())
}

/// Package the chart into the artifact directory at the build version.
pub fn helm(ctx: &mut StepExec) -> Result<()> {
    let chart_dir = ctx.config.chart_root_dir()?;
    ctx.collab.charts.dependency_build(&chart_dir)?;
    let artifacts_dir = ctx.config.artifacts_dir()?;
    let version = ctx.config.version()?;
    log_status!("Packaging chart {}", chart_dir.display());
    ctx.collab.charts.package(&chart_dir, &artifacts_dir, &version)
}

/// Collect the declared artifact globs into the artifact directory. Every
/// pattern must match at least one file.
pub fn filecopy(ctx: &mut StepExec) -> Result<()> {
    let specs = match ctx.step.truthy_field("artifacts") {
        None => return Ok(()),
        Some(Value::Array(specs)) => specs.clone(),
        Some(_) => {
            return Err(Error::config_invalid_value(
                "artifacts",
                "expected a list of artifact mappings",
            ))
        }
    };
    let artifacts_dir = ctx.config.artifacts_dir()?;
    let default_source = ctx.config.get_str(Phase::Build, "source_dir")?;

    for spec in &specs {
        let Some(entry) = spec.as_object() else {
            return Err(Error::config_invalid_value(
                "artifacts",
                "expected a list of artifact mappings",
            ));
        };
        let source_dir = match entry.get("source_dir").and_then(Value::as_str) {
            Some(dir) => resolve_dir(ctx.config.project_root(), dir),
            None => PathBuf::from(&default_source),
        };
        let mut target_dir = artifacts_dir.clone();
        if let Some(sub) = entry.get("target_dir").and_then(Value::as_str) {
            target_dir = target_dir.join(sub);
        }
        std::fs::create_dir_all(&target_dir)?;
        let versioned = entry.get("versioned").map(is_truthy).unwrap_or(false);

        let Some(Value::Array(patterns)) = entry.get("files") else {
            return Err(Error::config_invalid_value(
                "artifacts",
                "each artifact entry requires a files list",
            ));
        };
        for pattern in patterns {
            let Some(pattern) = pattern.as_str() else {
                return Err(Error::config_invalid_value(
                    "artifacts",
                    "expected a list of file patterns",
                ));
            };
            let full = source_dir.join(pattern).display().to_string();
            let matches = artifact::glob_matches(&full)?;
            if matches.is_empty() {
                return Err(Error::config_invalid_value(
                    "artifacts",
                    format!("No files match pattern: {pattern}"),
                ));
            }
            for source in matches {
                let name = source
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_default();
                let dest_name = if versioned {
                    tagged_name(&name, &ctx.config.version()?)
                } else {
                    name
                };
                let dest = target_dir.join(&dest_name);
                log_status!("Copying {} to {}", source.display(), dest.display());
                std::fs::copy(&source, &dest)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushes_default_off_only_for_local_runs() {
        assert!(!push_enabled(&EnvOverlay::default()));
        assert!(!push_enabled(&EnvOverlay::from_vars([("VJER_ENV", "local")])));
        assert!(push_enabled(&EnvOverlay::from_vars([("VJER_ENV", "ci")])));
        assert!(push_enabled(&EnvOverlay::from_vars([
            ("VJER_ENV", "local"),
            ("VJER_DOCKER_PUSH", "yes"),
        ])));
        assert!(!push_enabled(&EnvOverlay::from_vars([
            ("VJER_ENV", "ci"),
            ("VJER_DOCKER_PUSH", "false"),
        ])));
    }
}
