//! Helm operations: chart packaging, linting, deploys, and repositories.

use std::path::{Path, PathBuf};

use serde_json::Value;
use uuid::Uuid;

use crate::env::EnvOverlay;
use crate::error::{Error, Result};
use crate::utils::command;

/// A chart repository resolved from the `chart_repo` configuration value.
#[derive(Debug)]
pub struct ChartRepo {
    pub repo_type: String,
    pub name: String,
    pub url: String,
}

impl ChartRepo {
    /// Build from the `chart_repo` mapping. Non-OCI repositories declared by
    /// URL only are registered under a generated alias so parallel jobs on
    /// the same runner cannot collide.
    pub fn resolve(value: &Value, charts: &dyn ChartTool) -> Result<Self> {
        let repo_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("chartmuseum")
            .to_string();
        let url = value
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let mut name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        if repo_type != "oci" && name.is_empty() {
            if url.is_empty() {
                return Err(Error::config_invalid_value(
                    "chart_repo",
                    "a name or url is required",
                ));
            }
            let tag = Uuid::new_v4().simple().to_string();
            name = format!("vjer-{}", &tag[..8]);
            charts.repo_add(&name, &url)?;
            charts.repo_update()?;
        }

        Ok(Self {
            repo_type,
            name,
            url,
        })
    }

    /// Chart reference as the chart tool expects it for this repository.
    pub fn chart_ref(&self, chart: &str) -> String {
        if self.repo_type == "oci" {
            let base = self.url.trim_end_matches('/');
            if base.starts_with("oci://") {
                format!("{base}/{chart}")
            } else {
                format!("oci://{base}/{chart}")
            }
        } else {
            format!("{}/{chart}", self.name)
        }
    }
}

/// Helm surface the test, build, deploy, and release steps depend on.
pub trait ChartTool {
    fn dependency_build(&self, chart_dir: &Path) -> Result<()>;
    fn lint(&self, chart_dir: &Path) -> Result<()>;
    fn template(&self, chart_dir: &Path) -> Result<()>;
    /// Package a chart into `dest_dir`, stamping `version`.
    fn package(&self, chart_dir: &Path, dest_dir: &Path, version: &str) -> Result<()>;
    /// Push a packaged chart to a repository.
    fn push(&self, package: &Path, repo: &ChartRepo, version: &str) -> Result<()>;
    /// Install or upgrade a release.
    fn upgrade(&self, release: &str, chart: &str, args: &[String]) -> Result<()>;
    fn rollback(&self, release: &str) -> Result<()>;
    fn repo_add(&self, name: &str, url: &str) -> Result<()>;
    fn repo_update(&self) -> Result<()>;
}

/// `helm` CLI wrapper rooted at the project directory.
pub struct HelmCli {
    root: PathBuf,
    env: EnvOverlay,
}

impl HelmCli {
    pub fn new(root: &Path, env: EnvOverlay) -> Self {
        Self {
            root: root.to_path_buf(),
            env,
        }
    }

    /// Captured form, used where the caller inspects failure output.
    fn helm(&self, args: &[&str], context: &str) -> Result<String> {
        command::run_in_env(&self.root, "helm", args, &self.env, context)
    }

    fn helm_streamed(&self, args: &[&str], context: &str) -> Result<()> {
        command::run_streamed(&self.root, "helm", args, &self.env, context)
    }
}

impl ChartTool for HelmCli {
    fn dependency_build(&self, chart_dir: &Path) -> Result<()> {
        let chart = chart_dir.display().to_string();
        self.helm_streamed(&["dependency", "build", &chart], "helm dependency build")
    }

    fn lint(&self, chart_dir: &Path) -> Result<()> {
        let chart = chart_dir.display().to_string();
        self.helm_streamed(&["lint", &chart], "helm lint")
    }

    fn template(&self, chart_dir: &Path) -> Result<()> {
        let chart = chart_dir.display().to_string();
        self.helm_streamed(&["template", &chart], "helm template")
    }

    fn package(&self, chart_dir: &Path, dest_dir: &Path, version: &str) -> Result<()> {
        let chart = chart_dir.display().to_string();
        let dest = dest_dir.display().to_string();
        self.helm_streamed(
            &[
                "package",
                &chart,
                "--destination",
                &dest,
                "--version",
                version,
                "--app-version",
                version,
            ],
            "helm package",
        )
    }

    // Captured rather than streamed: repository conflicts are reported in
    // the failure output and some callers recover from them.
    fn push(&self, package: &Path, repo: &ChartRepo, version: &str) -> Result<()> {
        let package = package.display().to_string();
        match repo.repo_type.as_str() {
            "chartmuseum" => self
                .helm(
                    &["cm-push", &package, &repo.name, "--version", version],
                    "helm cm-push",
                )
                .map(|_| ()),
            "jfrog" => self
                .helm(
                    &["push-artifactory", &package, &repo.url],
                    "helm push-artifactory",
                )
                .map(|_| ()),
            "oci" => {
                let target = if repo.url.starts_with("oci://") {
                    repo.url.clone()
                } else {
                    format!("oci://{}", repo.url)
                };
                self.helm(&["push", &package, &target], "helm push").map(|_| ())
            }
            _ => self
                .helm(&["push", &package, &repo.name], "helm push")
                .map(|_| ()),
        }
    }

    fn upgrade(&self, release: &str, chart: &str, args: &[String]) -> Result<()> {
        let mut full = vec!["upgrade", release, chart, "--install", "--atomic", "--wait"];
        full.extend(args.iter().map(String::as_str));
        self.helm_streamed(&full, "helm upgrade")
    }

    fn rollback(&self, release: &str) -> Result<()> {
        self.helm_streamed(&["rollback", release, "--wait"], "helm rollback")
    }

    fn repo_add(&self, name: &str, url: &str) -> Result<()> {
        self.helm_streamed(&["repo", "add", name, url], "helm repo add")
    }

    fn repo_update(&self) -> Result<()> {
        self.helm_streamed(&["repo", "update"], "helm repo update")
    }
}
