//! Built-in step handlers, one module per phase, plus the helpers the
//! docker and helm handlers share.

pub mod build;
pub mod deploy;
pub mod release;
pub mod rollback;
pub mod test;

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::collab::REGISTRY_TYPES;
use crate::config::{Phase, ProjectConfig};
use crate::error::{Error, Result};
use crate::expand::scalar_text;
use crate::step::{HandlerRegistry, StepContext, StepExec};
use crate::utils::command;

/// Handler registry covering every built-in step type.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry.register(Phase::Test, "exec", run_exec_step);
    registry.register(Phase::Test, "docker", test::docker);
    registry.register(Phase::Test, "helm", test::helm);

    registry.register(Phase::Build, "exec", run_exec_step);
    registry.register(Phase::Build, "docker", build::docker);
    registry.register(Phase::Build, "helm", build::helm);
    registry.register(Phase::Build, "filecopy", build::filecopy);

    registry.register(Phase::Deploy, "exec", run_exec_step);
    registry.register(Phase::Deploy, "helm", deploy::helm);
    registry.register(Phase::Deploy, "filecopy", deploy::filecopy);

    registry.register(Phase::Rollback, "exec", run_exec_step);
    registry.register(Phase::Rollback, "helm", rollback::helm);

    registry.register(Phase::Release, "exec", run_exec_step);
    registry.register(Phase::Release, "tag_source", release::tag_source);
    registry.register(Phase::Release, "gitlab", release::gitlab);
    registry.register(Phase::Release, "increment_release", release::increment_release);
    registry.register(Phase::Release, "docker", release::docker);
    registry.register(Phase::Release, "helm", release::helm);
    registry.register(Phase::Release, "file", release::file);

    registry
}

/// `exec` steps run a command line through the shell from the project root.
pub fn run_exec_step(ctx: &mut StepExec) -> Result<()> {
    let mut line = ctx
        .step
        .field_str("command")
        .ok_or_else(|| Error::config_invalid_value("command", "exec steps require a command"))?;
    if let Some(Value::Array(args)) = ctx.step.truthy_field("args") {
        for arg in args {
            let text = scalar_text(arg).ok_or_else(|| {
                Error::config_invalid_value("args", "expected a list of scalar arguments")
            })?;
            line.push(' ');
            line.push_str(&text);
        }
    }
    command::run_streamed(
        ctx.config.project_root(),
        "sh",
        ["-c", line.as_str()],
        ctx.config.env(),
        "exec step",
    )
}

// === Docker helpers ===

/// Everything the docker handlers need to name an image.
#[derive(Debug)]
pub(crate) struct DockerImage {
    pub image_name: String,
    pub version_tag: String,
    pub image_tag: String,
    pub registry_type: String,
}

/// Resolve the registry configuration and derive the image names. Build
/// tags carry the build number; on pre-release runs the version itself
/// already does, so the version tag is used as-is.
pub(crate) fn docker_init(
    config: &ProjectConfig,
    step: &StepContext,
    pre_release: bool,
) -> Result<DockerImage> {
    let registry = match step.truthy_field("container_registry") {
        Some(value) => value.clone(),
        None => config.get(Phase::Project, "container_registry")?,
    };
    let registry_type = registry
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("local")
        .to_string();
    if !REGISTRY_TYPES.contains(&registry_type.as_str()) {
        return Err(Error::unknown_object(
            "container registry type",
            &registry_type,
        ));
    }
    let registry_name = registry.get("name").and_then(Value::as_str).unwrap_or("");

    let base = match step.field_str("image") {
        Some(image) => image,
        None => config.project_name()?,
    };
    let image_name = if registry_name.is_empty() {
        base
    } else {
        format!("{registry_name}/{base}")
    };
    let version_tag = format!("{image_name}:{}", config.version()?);
    let image_tag = if pre_release {
        version_tag.to_lowercase()
    } else {
        format!("{version_tag}-{}", config.build_num()?).to_lowercase()
    };

    Ok(DockerImage {
        image_name,
        version_tag,
        image_tag,
        registry_type,
    })
}

// === Helm helpers ===

/// Chart to operate on: the step's `chart_name` field, or the project name.
pub(crate) fn chart_name(config: &ProjectConfig, step: &StepContext) -> Result<String> {
    Ok(match step.field_str("chart_name") {
        Some(chart) => chart,
        None => config.project_name()?.to_lowercase(),
    })
}

/// Helm release to operate on: the step's `release_name`, or the chart.
pub(crate) fn release_name(config: &ProjectConfig, step: &StepContext) -> Result<String> {
    Ok(match step.field_str("release_name") {
        Some(name) => name.to_lowercase(),
        None => chart_name(config, step)?,
    })
}

/// Extra helm arguments from the step's `helm_args`, `values_files`, and
/// `helm_variables` fields. Values files are read from the artifact
/// directory, where the build phase placed them.
pub(crate) fn helm_args(config: &ProjectConfig, step: &StepContext) -> Result<Vec<String>> {
    let mut args = Vec::new();
    if let Some(Value::Object(extra)) = step.truthy_field("helm_args") {
        for (key, value) in extra {
            args.push(format!("--{}", key.replace('_', "-")));
            if !matches!(value, Value::Bool(true)) {
                let text = scalar_text(value).ok_or_else(|| {
                    Error::config_invalid_value("helm_args", "expected scalar values")
                })?;
                args.push(text);
            }
        }
    }
    if let Some(Value::Array(files)) = step.truthy_field("values_files") {
        let artifacts_dir = config.artifacts_dir()?;
        for file in files {
            let name = scalar_text(file).ok_or_else(|| {
                Error::config_invalid_value("values_files", "expected a list of file names")
            })?;
            args.push("-f".to_string());
            args.push(artifacts_dir.join(name).display().to_string());
        }
    }
    if let Some(Value::Object(vars)) = step.truthy_field("helm_variables") {
        for (key, value) in vars {
            let text = scalar_text(value).ok_or_else(|| {
                Error::config_invalid_value("helm_variables", "expected scalar values")
            })?;
            args.push("--set".to_string());
            args.push(format!("{key}={text}"));
        }
    }
    Ok(args)
}

/// Packaged chart path in the artifact directory:
/// `{pkg_name or project name}-{version}.tgz`, lowercased.
pub(crate) fn helm_package_path(config: &ProjectConfig, step: &StepContext) -> Result<PathBuf> {
    let base = match step.field_str("pkg_name") {
        Some(name) => name,
        None => config.project_name()?,
    };
    let file = format!("{base}-{}.tgz", config.version()?).to_lowercase();
    Ok(config.artifacts_dir()?.join(file))
}

/// Split a file name at its final extension.
pub(crate) fn name_parts(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name, ""),
    }
}

/// Insert a tag between a file name's stem and its extension.
pub(crate) fn tagged_name(name: &str, tag: &str) -> String {
    let (stem, suffix) = name_parts(name);
    format!("{stem}-{tag}{suffix}")
}

/// Resolve a configured directory: tilde-expanded, then taken as-is when
/// absolute or joined to the project root.
pub(crate) fn resolve_dir(root: &Path, dir: &str) -> PathBuf {
    let expanded = shellexpand::tilde(dir);
    let candidate = PathBuf::from(expanded.as_ref());
    if candidate.is_absolute() {
        candidate
    } else {
        root.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvOverlay;
    use crate::error::ErrorCode;
    use serde_json::json;
    use tempfile::TempDir;

    fn load_fixture(dir: &TempDir, contents: &str, env: EnvOverlay) -> ProjectConfig {
        std::fs::write(dir.path().join("vjer.yml"), contents).unwrap();
        ProjectConfig::load(dir.path(), &env).unwrap()
    }

    #[test]
    fn docker_init_derives_tags_from_the_registry() {
        let dir = TempDir::new().unwrap();
        let config = load_fixture(
            &dir,
            "schema: 3\nproject:\n  name: MyApp\n  version: 1.2.3\n  container_registry:\n    type: jfrog\n    name: Registry.Example.com/repo\n",
            EnvOverlay::from_vars([("VJER_BUILD_NUM", "7")]),
        );
        let step = StepContext::bare("docker");

        let image = docker_init(&config, &step, false).unwrap();
        assert_eq!(image.image_name, "Registry.Example.com/repo/MyApp");
        assert_eq!(image.version_tag, "Registry.Example.com/repo/MyApp:1.2.3");
        assert_eq!(image.image_tag, "registry.example.com/repo/myapp:1.2.3-7");
        assert_eq!(image.registry_type, "jfrog");
    }

    #[test]
    fn pre_release_tags_carry_no_extra_build_number() {
        let dir = TempDir::new().unwrap();
        let config = load_fixture(
            &dir,
            "schema: 3\nproject:\n  name: app\n  version: 1.2.3-7\n",
            EnvOverlay::from_vars([("VJER_BUILD_NUM", "7")]),
        );
        let step = StepContext::bare("docker");

        let image = docker_init(&config, &step, true).unwrap();
        assert_eq!(image.image_tag, "app:1.2.3-7");
    }

    #[test]
    fn unknown_registry_types_are_rejected() {
        let dir = TempDir::new().unwrap();
        let config = load_fixture(
            &dir,
            "schema: 3\nproject:\n  name: app\n  version: 1.0.0\n  container_registry:\n    type: quay\n",
            EnvOverlay::default(),
        );
        let step = StepContext::bare("docker");

        let err = docker_init(&config, &step, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::StepUnknownObject);
        assert!(err.message.contains("quay"));
    }

    #[test]
    fn helm_args_cover_values_files_and_variables() {
        let dir = TempDir::new().unwrap();
        let config = load_fixture(
            &dir,
            "schema: 3\nproject:\n  name: app\n  version: 1.0.0\n",
            EnvOverlay::default(),
        );
        let step = StepContext::from_value(&json!({
            "type": "helm",
            "helm_args": { "no_hooks": true, "timeout": "5m" },
            "values_files": ["prod.yml"],
            "helm_variables": { "replicas": 3 }
        }))
        .unwrap();

        let args = helm_args(&config, &step).unwrap();
        let artifacts = config.artifacts_dir().unwrap();
        assert_eq!(
            args,
            vec![
                "--no-hooks".to_string(),
                "--timeout".to_string(),
                "5m".to_string(),
                "-f".to_string(),
                artifacts.join("prod.yml").display().to_string(),
                "--set".to_string(),
                "replicas=3".to_string(),
            ]
        );
    }

    #[test]
    fn release_name_falls_back_to_the_chart_then_the_project() {
        let dir = TempDir::new().unwrap();
        let config = load_fixture(
            &dir,
            "schema: 3\nproject:\n  name: MyApp\n  version: 1.0.0\n",
            EnvOverlay::default(),
        );

        let bare = StepContext::bare("helm");
        assert_eq!(release_name(&config, &bare).unwrap(), "myapp");

        let named = StepContext::from_value(&json!({
            "type": "helm",
            "chart_name": "web",
            "release_name": "Frontend"
        }))
        .unwrap();
        assert_eq!(chart_name(&config, &named).unwrap(), "web");
        assert_eq!(release_name(&config, &named).unwrap(), "frontend");
    }

    #[test]
    fn helm_packages_live_in_the_artifact_directory() {
        let dir = TempDir::new().unwrap();
        let config = load_fixture(
            &dir,
            "schema: 3\nproject:\n  name: MyApp\n  version: 1.2.3\n",
            EnvOverlay::default(),
        );

        let bare = StepContext::bare("helm");
        let package = helm_package_path(&config, &bare).unwrap();
        assert_eq!(package, config.artifacts_dir().unwrap().join("myapp-1.2.3.tgz"));

        let named = StepContext::from_value(&json!({"type": "helm", "pkg_name": "Charts"})).unwrap();
        let package = helm_package_path(&config, &named).unwrap();
        assert!(package.ends_with("charts-1.2.3.tgz"));
    }

    #[test]
    fn tagged_names_keep_the_extension() {
        assert_eq!(tagged_name("app.zip", "7"), "app-7.zip");
        assert_eq!(tagged_name("bundle.tar.gz", "1.2.3"), "bundle.tar-1.2.3.gz");
        assert_eq!(tagged_name("README", "7"), "README-7");
    }

    #[test]
    fn configured_directories_resolve_against_the_project_root() {
        let root = Path::new("/work/project");
        assert_eq!(resolve_dir(root, "dist"), PathBuf::from("/work/project/dist"));
        assert_eq!(resolve_dir(root, "/opt/out"), PathBuf::from("/opt/out"));
    }
}
