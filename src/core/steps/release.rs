//! Release phase handlers, shared by the release and pre-release actions.

use std::path::Path;
use std::slice;

use serde_json::{json, Value};

use crate::collab::{storage, vcs, ChartRepo, ReleaseSpec};
use crate::config::Phase;
use crate::error::{Error, RecoverableError, Result};
use crate::expand::scalar_text;
use crate::log_status;
use crate::step::StepExec;
use crate::utils::artifact;
use crate::version;

use super::{docker_init, helm_package_path, name_parts, tagged_name};

/// Tag the source with the release tag.
pub fn tag_source(ctx: &mut StepExec) -> Result<()> {
    if ctx.is_pre_release {
        log_status!("Skipping on pre-release");
        return Ok(());
    }
    let tag = ctx.config.get_str(Phase::Release, "release_tag")?;
    log_status!("Tagging the source as {}", tag);
    vcs::tag_source(
        ctx.collab.vcs.as_ref(),
        ctx.config.env(),
        &tag,
        &format!("Release {tag}"),
    )
}

/// Create the release record on the CI host, optionally linking the job
/// artifacts.
pub fn gitlab(ctx: &mut StepExec) -> Result<()> {
    if ctx.is_pre_release {
        log_status!("Skipping on pre-release");
        return Ok(());
    }
    let version = ctx.config.version()?;
    let tag = ctx.config.get_str(Phase::Release, "release_tag")?;
    let assets_url = if ctx.step.field_flag("publish_artifacts") {
        let env = ctx.config.env();
        let url = format!(
            "{}/{}/-/jobs/{}/artifacts/download",
            env.require("CI_SERVER_URL")?,
            env.require("CI_PROJECT_PATH")?,
            env.require("CI_JOB_ID")?
        );
        Some(("Artifacts".to_string(), url))
    } else {
        None
    };
    let name = format!("Release {version}");
    log_status!("Creating release: {}", name);
    ctx.collab.host.create_release(&ReleaseSpec {
        name: name.clone(),
        tag,
        description: name,
        assets_url,
    })
}

/// Bump the final version component and check the updated configuration
/// file back in. Only the document-managed version service is bumped.
pub fn increment_release(ctx: &mut StepExec) -> Result<()> {
    if ctx.is_pre_release {
        log_status!("Skipping on pre-release");
        return Ok(());
    }
    let service = ctx.config.get(Phase::Project, "version_service")?;
    let service_type = service.get("type").and_then(Value::as_str).unwrap_or("vjer");
    if service_type != "vjer" {
        log_status!("Skipping the increment for the {} version service", service_type);
        return Ok(());
    }

    let next = version::bump_last_component(&ctx.config.version()?)?;
    let branch = match ctx.step.field_str("increment_branch") {
        Some(branch) => branch,
        None => ctx.config.env().require("CI_COMMIT_REF_NAME")?.to_string(),
    };
    log_status!("Incrementing release to {} on branch {}", next, branch);

    let env = ctx.config.env().clone();
    let config_file = ctx.config.path().to_path_buf();
    let config = &mut *ctx.config;
    vcs::commit_files(
        ctx.collab.vcs.as_ref(),
        &env,
        "Automated pipeline version update check-in [skip ci]",
        &branch,
        slice::from_ref(&config_file),
        || {
            config.set(Phase::Project, "version", json!(next));
            config.write()
        },
    )
}

/// Retag the build image for the release and push every tag.
pub fn docker(ctx: &mut StepExec) -> Result<()> {
    let image = docker_init(ctx.config, &ctx.step, ctx.is_pre_release)?;
    // gcp and jfrog images are retagged without a local pull.
    if !matches!(image.registry_type.as_str(), "gcp" | "jfrog") {
        ctx.collab.registry.pull(&image.image_tag)?;
    }

    let tags = match ctx.step.truthy_field("tags") {
        Some(Value::Array(declared)) => declared
            .iter()
            .map(|tag| {
                scalar_text(tag).ok_or_else(|| {
                    Error::config_invalid_value("tags", "expected a list of image tags")
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => {
            return Err(Error::config_invalid_value(
                "tags",
                "expected a list of image tags",
            ))
        }
        None => {
            let mut tags = vec![image.version_tag.to_lowercase()];
            if !ctx.is_pre_release {
                tags.push(format!("{}:latest", image.image_name).to_lowercase());
            }
            tags
        }
    };

    for tag in &tags {
        log_status!("Tagging image: {}", tag);
        ctx.collab.registry.tag(&image.image_tag, tag)?;
        ctx.collab.registry.push(tag)?;
    }
    Ok(())
}

/// Push the packaged chart to the chart repository. Pre-release runs
/// package the chart at the transient version first and tolerate a chart
/// that already exists.
pub fn helm(ctx: &mut StepExec) -> Result<()> {
    let repo_value = ctx.lookup("chart_repo")?;
    let repo = ChartRepo::resolve(&repo_value, ctx.collab.charts.as_ref())?;
    let package = helm_package_path(ctx.config, &ctx.step)?;

    if ctx.is_pre_release {
        prepare_pre_release_package(ctx, &repo, &package)?;
    }

    let version = ctx.config.version()?;
    log_status!("Pushing chart package {}", package.display());
    match ctx.collab.charts.push(&package, &repo, &version) {
        Err(err) if ctx.is_pre_release && RecoverableError::ChartVersionExists.matches(&err) => {
            log_status!("Skipping pre-release of Helm chart: chart already exists at this version");
            Ok(())
        }
        other => other,
    }
}

/// Materialize the pre-release package. OCI repositories get a fresh
/// package at the patched version, with the version files restored on
/// every path; the rest rename the built package to the pre-release name.
fn prepare_pre_release_package(ctx: &mut StepExec, repo: &ChartRepo, package: &Path) -> Result<()> {
    if repo.repo_type == "oci" {
        version::update_version_files(ctx.config, &ctx.step, false)?;
        let chart_dir = ctx.config.chart_root_dir()?;
        let artifacts_dir = ctx.config.artifacts_dir()?;
        let packaged = ctx
            .collab
            .charts
            .package(&chart_dir, &artifacts_dir, &ctx.config.version()?);
        let reset = version::update_version_files(ctx.config, &ctx.step, true);
        return packaged.and(reset);
    }

    let pattern = ctx.config.artifacts_dir()?.join("*.tgz").display().to_string();
    let existing = artifact::resolve_artifact_path(&pattern)?;
    if existing != *package {
        std::fs::rename(&existing, package)?;
    }
    Ok(())
}

/// Publish each released file from the artifact directory. Pre-release
/// runs publish build-number-suffixed copies and restore the originals.
pub fn file(ctx: &mut StepExec) -> Result<()> {
    let entries = match ctx.step.truthy_field("files") {
        None => return Ok(()),
        Some(Value::Array(entries)) => entries.clone(),
        Some(_) => {
            return Err(Error::config_invalid_value(
                "files",
                "expected a list of file names",
            ))
        }
    };
    let artifacts_dir = ctx.config.artifacts_dir()?;
    let build_num = ctx.config.build_num()?;

    for entry in &entries {
        let Some(name) = scalar_text(entry) else {
            return Err(Error::config_invalid_value(
                "files",
                "expected a list of file names",
            ));
        };
        let (stem, suffix) = name_parts(&name);
        let pattern = artifacts_dir.join(format!("{stem}*{suffix}")).display().to_string();
        for path in artifact::glob_matches(&pattern)? {
            if ctx.is_pre_release {
                publish_pre_release_copy(ctx, &path, &build_num)?;
            } else {
                let package = file_name_of(&path)?;
                storage::publish_package(ctx.collab.storage.as_ref(), &path, &package, false)?;
            }
        }
    }
    Ok(())
}

/// Publish a transient copy named for the build, restoring the original
/// file whether or not the publish succeeded.
fn publish_pre_release_copy(ctx: &StepExec, path: &Path, build_num: &str) -> Result<()> {
    let package = tagged_name(&file_name_of(path)?, build_num);
    let staged = path.with_file_name(&package);
    std::fs::rename(path, &staged)?;
    let published = storage::publish_package(ctx.collab.storage.as_ref(), &staged, &package, true);
    let restored = std::fs::rename(&staged, path).map_err(Error::from);
    published.and(restored)
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| Error::internal_io(format!("Invalid artifact path: {}", path.display()), None))
}
