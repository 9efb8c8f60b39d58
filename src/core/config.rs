//! Project configuration.
//!
//! `vjer.yml` is a schema-gated document with one section per phase. Each
//! section is a two-layer store (explicit values over defaults) whose reads
//! pass through `{var:name}` expansion. Loading seeds construction-time
//! defaults, merges the document, then injects derived values (version,
//! build number, artifact directories, release tag) into the defaults layer
//! so explicit configuration always wins.

use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::{json, Map, Value};

use crate::env::EnvOverlay;
use crate::error::{Error, Result};
use crate::expand::{scalar_text, Expander, VarSource};
use crate::step::StepContext;
use crate::version;
use crate::utils::io;

pub const PROJECT_CFG_VAR: &str = "VJER_CFG";
pub const DEFAULT_CFG_FILE: &str = "vjer.yml";
pub const BUILD_NUM_VAR: &str = "VJER_BUILD_NUM";
pub const SUPPORTED_SCHEMAS: &[i64] = &[3];

// The release phase wraps user steps in fixed bookkeeping.
pub const RELEASE_PRE_STEPS: &[&str] = &["tag_source"];
pub const RELEASE_POST_STEPS: &[&str] = &["gitlab", "increment_release"];

// === Phases ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Project,
    Test,
    Build,
    Deploy,
    Rollback,
    Release,
}

impl Phase {
    /// Canonical order, also the serialization order for `write()`.
    pub const ALL: [Phase; 6] = [
        Phase::Project,
        Phase::Test,
        Phase::Build,
        Phase::Deploy,
        Phase::Rollback,
        Phase::Release,
    ];

    /// Placeholder resolution walks sections in this order; build comes
    /// last.
    pub const EXPANSION_ORDER: [Phase; 6] = [
        Phase::Project,
        Phase::Test,
        Phase::Deploy,
        Phase::Rollback,
        Phase::Release,
        Phase::Build,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Project => "project",
            Phase::Test => "test",
            Phase::Build => "build",
            Phase::Deploy => "deploy",
            Phase::Rollback => "rollback",
            Phase::Release => "release",
        }
    }
}

// === Sections ===

/// Two-layer key/value store for one phase: explicit document values over
/// defaults. Reads expand placeholders; a key absent from both layers is a
/// configuration error, never a silent null.
#[derive(Debug, Clone)]
pub struct ConfigSection {
    name: &'static str,
    values: Map<String, Value>,
    defaults: Map<String, Value>,
}

impl ConfigSection {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            values: Map::new(),
            defaults: Map::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Raw two-tier lookup, no expansion. This is what placeholder
    /// resolution sees.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key).or_else(|| self.defaults.get(key))
    }

    pub fn get(&self, key: &str, expander: &Expander) -> Result<Value> {
        match self.raw(key) {
            Some(value) => Ok(expander.expand_value(value)),
            None => Err(Error::config_missing_key(self.name, key)),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn update(&mut self, entries: Map<String, Value>) {
        for (key, value) in entries {
            self.values.insert(key, value);
        }
    }

    pub fn update_defaults(&mut self, entries: Map<String, Value>) {
        for (key, value) in entries {
            self.defaults.insert(key, value);
        }
    }

    /// Copy of the explicit values only. Defaults never persist.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.clone()
    }
}

impl VarSource for ConfigSection {
    fn raw_lookup(&self, name: &str) -> Option<&Value> {
        self.raw(name)
    }
}

// === Project configuration ===

#[derive(Debug)]
pub struct ProjectConfig {
    path: PathBuf,
    project_root: PathBuf,
    schema: i64,
    sections: [ConfigSection; 6],
    env: EnvOverlay,
}

impl ProjectConfig {
    /// Load and validate the project configuration.
    ///
    /// The file name comes from `VJER_CFG` (default `vjer.yml`), resolved
    /// against the project root unless absolute. Validation failures are
    /// fatal before any step runs: a missing file, an unparsable or
    /// non-mapping document, and an unsupported `schema` each carry their
    /// own error code.
    pub fn load(project_root: &Path, env: &EnvOverlay) -> Result<Self> {
        let file_name = env.get_or(PROJECT_CFG_VAR, DEFAULT_CFG_FILE);
        let candidate = PathBuf::from(shellexpand::tilde(file_name).as_ref());
        let path = if candidate.is_absolute() {
            candidate
        } else {
            project_root.join(candidate)
        };
        if !path.is_file() {
            return Err(Error::config_not_found(path.display()));
        }

        let text = io::read_file(&path, "read project configuration")?;
        let doc: Value = serde_yml::from_str(&text)
            .map_err(|e| Error::config_bad_format(path.display(), e))?;
        let Some(doc) = doc.as_object() else {
            return Err(Error::config_bad_format(
                path.display(),
                "top level must be a mapping",
            ));
        };

        let schema = doc.get("schema").and_then(Value::as_i64).unwrap_or(0);
        if !SUPPORTED_SCHEMAS.contains(&schema) {
            return Err(Error::config_invalid_schema(schema, SUPPORTED_SCHEMAS));
        }

        let mut config = Self {
            path,
            project_root: project_root.to_path_buf(),
            schema,
            sections: Phase::ALL.map(|phase| ConfigSection::new(phase.as_str())),
            env: env.clone(),
        };
        config.seed_defaults();

        for phase in Phase::ALL {
            if let Some(value) = doc.get(phase.as_str()) {
                let Some(entries) = value.as_object() else {
                    return Err(Error::config_invalid_value(
                        phase.as_str(),
                        "section must be a mapping",
                    ));
                };
                config.section_mut(phase).update(entries.clone());
            }
        }

        config.derive_defaults()?;
        Ok(config)
    }

    fn seed_defaults(&mut self) {
        let root = self.project_root.clone();
        self.section_mut(Phase::Project).update_defaults(json_map(&[
            ("project_root", json!(root.display().to_string())),
            ("build_artifacts", json!("artifacts")),
            ("build_num_var", json!(BUILD_NUM_VAR)),
            ("chart_root", json!("helm-chart")),
            ("container_registry", json!({"type": "local", "name": ""})),
            ("dockerfile", json!("Dockerfile")),
            ("test_results", json!("test_results")),
            ("version_service", json!({"type": "vjer"})),
        ]));
        self.section_mut(Phase::Build).update_defaults(json_map(&[
            ("source_dir", json!(root.join("src").display().to_string())),
            ("version_files", json!([])),
            ("artifacts", json!({})),
            (
                "build_date",
                json!(Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            ),
            (
                "platform",
                json!(format!(
                    "vjer-{}-{}",
                    std::env::consts::OS,
                    std::env::consts::ARCH
                )),
            ),
        ]));
    }

    fn derive_defaults(&mut self) -> Result<()> {
        let root = self.project_root.clone();
        let build_artifacts = self.get_str(Phase::Project, "build_artifacts")?;
        let test_results = self.get_str(Phase::Project, "test_results")?;
        self.section_mut(Phase::Project).update_defaults(json_map(&[
            (
                "artifacts_dir",
                json!(root.join(build_artifacts).display().to_string()),
            ),
            (
                "test_results_dir",
                json!(root.join(test_results).display().to_string()),
            ),
        ]));

        // Older documents name the registries docker_repo/helm_repo.
        if let Some(repo) = self.section(Phase::Project).raw("docker_repo").cloned() {
            self.section_mut(Phase::Project)
                .update_defaults(json_map(&[("container_registry", repo)]));
        }
        if let Some(repo) = self.section(Phase::Project).raw("helm_repo").cloned() {
            self.section_mut(Phase::Project)
                .update_defaults(json_map(&[("chart_repo", repo)]));
        }

        let service = self.get(Phase::Project, "version_service")?;
        if let Some(resolved) = version::service_version(&service, &self.env, &self.project_root)? {
            self.section_mut(Phase::Project).set("version", json!(resolved));
        }

        let build_num_var = self.get_str(Phase::Project, "build_num_var")?;
        let build_num = self.env.get_or(&build_num_var, "0").to_string();
        self.section_mut(Phase::Build)
            .update_defaults(json_map(&[("build_num", json!(build_num))]));

        // Version-derived values appear only when a version is available;
        // reading them without one fails with the ordinary missing-key
        // error.
        if let Ok(version) = self.get_str(Phase::Project, "version") {
            let build_num = self.get_str(Phase::Build, "build_num")?;
            let build_version = format!("{version}-{build_num}");
            let mut build_entries = vec![
                ("build_version", json!(build_version.clone())),
                (
                    "build_version_msbuild",
                    json!(format!("{version}.{build_num}")),
                ),
            ];
            if let Ok(name) = self.get_str(Phase::Project, "name") {
                build_entries.push(("build_name", json!(format!("{name}_{build_version}"))));
            }
            self.section_mut(Phase::Build)
                .update_defaults(json_map(&build_entries));
            self.section_mut(Phase::Release)
                .update_defaults(json_map(&[("release_tag", json!(format!("v{version}")))]));

            let mut pieces = version.splitn(3, '.');
            let mut components = Vec::new();
            if let Some(major) = pieces.next() {
                components.push(("major", json!(major)));
            }
            if let Some(minor) = pieces.next() {
                components.push(("minor", json!(minor)));
            }
            if let Some(patch) = pieces.next() {
                components.push(("patch", json!(patch)));
            }
            self.section_mut(Phase::Project)
                .update_defaults(json_map(&components));
        }
        Ok(())
    }

    // === Access ===

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn schema(&self) -> i64 {
        self.schema
    }

    pub fn env(&self) -> &EnvOverlay {
        &self.env
    }

    pub fn section(&self, phase: Phase) -> &ConfigSection {
        &self.sections[phase as usize]
    }

    pub fn section_mut(&mut self, phase: Phase) -> &mut ConfigSection {
        &mut self.sections[phase as usize]
    }

    /// Transient expansion view over all sections plus the overlay.
    pub fn expander(&self) -> Expander<'_> {
        let mut expander = Expander::new(&self.env);
        for phase in Phase::EXPANSION_ORDER {
            expander = expander.with_source(self.section(phase));
        }
        expander
    }

    pub fn get(&self, phase: Phase, key: &str) -> Result<Value> {
        self.section(phase).get(key, &self.expander())
    }

    pub fn get_opt(&self, phase: Phase, key: &str) -> Option<Value> {
        self.section(phase)
            .raw(key)
            .map(|value| self.expander().expand_value(value))
    }

    pub fn get_str(&self, phase: Phase, key: &str) -> Result<String> {
        let value = self.get(phase, key)?;
        scalar_text(&value).ok_or_else(|| {
            Error::config_invalid_value(
                &format!("{}.{}", phase.as_str(), key),
                "expected a scalar value",
            )
        })
    }

    pub fn set(&mut self, phase: Phase, key: &str, value: Value) {
        self.section_mut(phase).set(key, value);
    }

    pub fn expand_str(&self, text: &str) -> String {
        self.expander().expand_str(text)
    }

    pub fn version(&self) -> Result<String> {
        self.get_str(Phase::Project, "version")
    }

    pub fn project_name(&self) -> Result<String> {
        self.get_str(Phase::Project, "name")
    }

    pub fn build_num(&self) -> Result<String> {
        self.get_str(Phase::Build, "build_num")
    }

    pub fn artifacts_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.get_str(Phase::Project, "artifacts_dir")?))
    }

    pub fn test_results_dir(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(
            self.get_str(Phase::Project, "test_results_dir")?,
        ))
    }

    pub fn chart_root_dir(&self) -> Result<PathBuf> {
        Ok(self
            .project_root
            .join(self.get_str(Phase::Project, "chart_root")?))
    }

    // === Steps ===

    /// The effective step list for a phase.
    ///
    /// Most phases run exactly what they declare (or nothing). The release
    /// phase wraps declared steps in fixed bookkeeping: tag_source first,
    /// then the declared steps, then gitlab and increment_release. A
    /// declared step whose type matches a fixed slot configures that slot
    /// instead of running twice.
    pub fn steps(&self, phase: Phase) -> Result<Vec<StepContext>> {
        let declared = match self.section(phase).raw("steps") {
            Some(value) => {
                let expanded = self.expander().expand_value(value);
                let Value::Array(items) = expanded else {
                    return Err(Error::config_invalid_value(
                        &format!("{}.steps", phase.as_str()),
                        "expected a list of steps",
                    ));
                };
                items
                    .iter()
                    .map(StepContext::from_value)
                    .collect::<Result<Vec<_>>>()?
            }
            None => Vec::new(),
        };

        if phase != Phase::Release {
            return Ok(declared);
        }

        let fixed = |step_type: &str| {
            declared
                .iter()
                .find(|step| step.step_type == step_type)
                .cloned()
                .unwrap_or_else(|| StepContext::bare(step_type))
        };
        let mut effective: Vec<StepContext> =
            RELEASE_PRE_STEPS.iter().map(|t| fixed(t)).collect();
        effective.extend(
            declared
                .iter()
                .filter(|step| {
                    !RELEASE_PRE_STEPS.contains(&step.step_type.as_str())
                        && !RELEASE_POST_STEPS.contains(&step.step_type.as_str())
                })
                .cloned(),
        );
        effective.extend(RELEASE_POST_STEPS.iter().map(|t| fixed(t)));
        Ok(effective)
    }

    // === Persistence ===

    /// Serialize `schema` plus every non-empty section's explicit values
    /// back to the configuration file, sections in canonical order. The
    /// document is built as an insertion-ordered YAML mapping so the
    /// section order survives serialization.
    pub fn write(&self) -> Result<()> {
        let mut doc = serde_yml::Mapping::new();
        doc.insert(
            serde_yml::Value::from("schema"),
            serde_yml::Value::from(self.schema),
        );
        for phase in Phase::ALL {
            let snapshot = self.section(phase).snapshot();
            if !snapshot.is_empty() {
                let section = serde_yml::to_value(Value::Object(snapshot))
                    .map_err(|e| Error::yaml("serialize project configuration", e))?;
                doc.insert(serde_yml::Value::from(phase.as_str()), section);
            }
        }
        let yaml = serde_yml::to_string(&doc)
            .map_err(|e| Error::yaml("serialize project configuration", e))?;
        io::write_file_atomic(&self.path, &yaml, "write project configuration")
    }
}

fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}
