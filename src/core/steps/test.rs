//! Test phase handlers.

use serde_yml::Value as YamlValue;

use crate::error::{Error, Result};
use crate::log_status;
use crate::step::StepExec;
use crate::utils::{command, io};
use crate::version;

use super::docker_init;

/// Lint the Dockerfile with hadolint, then build the test stage when the
/// step names one.
pub fn docker(ctx: &mut StepExec) -> Result<()> {
    let dockerfile = ctx.lookup_str("dockerfile")?;
    let path = ctx.config.project_root().join(&dockerfile);
    log_status!("Linting {}", dockerfile);
    let contents = io::read_bytes(&path, "read Dockerfile")?;
    command::run_with_stdin(
        ctx.config.project_root(),
        "docker",
        ["run", "--rm", "--interactive", "hadolint/hadolint"],
        ctx.config.env(),
        &contents,
        "hadolint",
    )?;

    if let Some(stage) = ctx.step.field_str("test_stage") {
        let image = docker_init(ctx.config, &ctx.step, ctx.is_pre_release)?;
        let tag = format!("{}-test", image.image_tag);
        log_status!("Building test stage {} as {}", stage, tag);
        command::run_streamed(
            ctx.config.project_root(),
            "docker",
            [
                "build",
                "--pull",
                "--rm",
                "--file",
                dockerfile.as_str(),
                "--target",
                stage.as_str(),
                "--tag",
                tag.as_str(),
                ".",
            ],
            ctx.config.env(),
            "docker build",
        )?;
    }
    Ok(())
}

/// Lint the chart and render its templates. Library charts stop after the
/// lint since they produce no manifests.
pub fn helm(ctx: &mut StepExec) -> Result<()> {
    let chart_dir = ctx.config.chart_root_dir()?;
    ctx.collab.charts.dependency_build(&chart_dir)?;
    ctx.collab.charts.lint(&chart_dir)?;

    let metadata = io::read_file(&chart_dir.join(version::HELM_CHART_FILE), "read chart metadata")?;
    let chart: YamlValue =
        serde_yml::from_str(&metadata).map_err(|err| Error::yaml("parse chart metadata", err))?;
    let chart_type = chart
        .get("type")
        .and_then(YamlValue::as_str)
        .unwrap_or("application");
    if chart_type == "library" {
        log_status!("Skipping template rendering for a library chart");
        return Ok(());
    }
    ctx.collab.charts.template(&chart_dir)
}
