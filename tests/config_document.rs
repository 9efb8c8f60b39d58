use serde_json::json;
use tempfile::TempDir;
use vjer::config::{Phase, ProjectConfig, PROJECT_CFG_VAR};
use vjer::env::EnvOverlay;
use vjer::error::{exit_code_for_error, ErrorCode};

const MINIMAL: &str = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\n";

fn load(dir: &TempDir, contents: &str, vars: &[(&str, &str)]) -> ProjectConfig {
    std::fs::write(dir.path().join("vjer.yml"), contents).unwrap();
    let env = EnvOverlay::from_vars(vars.iter().copied());
    ProjectConfig::load(dir.path(), &env).unwrap()
}

#[test]
fn a_missing_configuration_file_is_a_setup_error() {
    let dir = TempDir::new().unwrap();

    let err = ProjectConfig::load(dir.path(), &EnvOverlay::default()).unwrap_err();

    assert_eq!(err.code, ErrorCode::ConfigNotFound);
    assert!(err.message.contains("vjer.yml"));
    assert_eq!(exit_code_for_error(&err), 2);
}

#[test]
fn the_environment_relocates_the_configuration_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("pipeline.yml"), MINIMAL).unwrap();
    let env = EnvOverlay::from_vars([(PROJECT_CFG_VAR, "pipeline.yml")]);

    let config = ProjectConfig::load(dir.path(), &env).unwrap();

    assert_eq!(config.version().unwrap(), "1.2.3");
    assert!(config.path().ends_with("pipeline.yml"));
}

#[test]
fn unsupported_schema_versions_are_rejected() {
    let dir = TempDir::new().unwrap();
    let contents = "schema: 2\nproject:\n  name: app\n  version: 1.0.0\n";
    std::fs::write(dir.path().join("vjer.yml"), contents).unwrap();

    let err = ProjectConfig::load(dir.path(), &EnvOverlay::default()).unwrap_err();

    assert_eq!(err.code, ErrorCode::ConfigInvalidSchema);
    assert!(err.message.contains('2'));
}

#[test]
fn declared_values_shadow_the_seeded_defaults() {
    let dir = TempDir::new().unwrap();
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\n  build_artifacts: dist\n";
    let config = load(&dir, contents, &[]);

    assert_eq!(
        config.get_str(Phase::Project, "build_artifacts").unwrap(),
        "dist"
    );
    assert!(config.artifacts_dir().unwrap().ends_with("dist"));
    // Untouched keys keep their defaults.
    assert_eq!(
        config.get_str(Phase::Project, "test_results").unwrap(),
        "test_results"
    );
}

#[test]
fn placeholders_expand_across_sections_on_read() {
    let dir = TempDir::new().unwrap();
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\n  motto: ship {var:name} {var:unknown}\n";
    let config = load(&dir, contents, &[("VJER_BUILD_NUM", "7")]);

    // Placeholders with no source survive untouched.
    assert_eq!(
        config.get_str(Phase::Project, "motto").unwrap(),
        "ship app {var:unknown}"
    );
    assert_eq!(
        config.get_str(Phase::Build, "build_name").unwrap(),
        "app_1.2.3-7"
    );
    assert_eq!(
        config.get_str(Phase::Release, "release_tag").unwrap(),
        "v1.2.3"
    );
    assert_eq!(config.get_str(Phase::Project, "minor").unwrap(), "2");
}

#[test]
fn step_fields_expand_before_dispatch() {
    let dir = TempDir::new().unwrap();
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\ndeploy:\n  steps:\n    - type: helm\n      release_name: app-{var:major}\n";
    let config = load(&dir, contents, &[]);

    let steps = config.steps(Phase::Deploy).unwrap();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].field_str("release_name").unwrap(), "app-1");
}

#[test]
fn release_steps_always_gain_the_bookkeeping_slots() {
    let dir = TempDir::new().unwrap();
    let config = load(&dir, MINIMAL, &[]);

    let steps = config.steps(Phase::Release).unwrap();
    let types: Vec<&str> = steps.iter().map(|s| s.step_type.as_str()).collect();

    assert_eq!(types, ["tag_source", "gitlab", "increment_release"]);
}

#[test]
fn declared_slot_configuration_moves_into_the_fixed_slot() {
    let dir = TempDir::new().unwrap();
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\nrelease:\n  steps:\n    - type: docker\n    - type: gitlab\n      publish_artifacts: true\n";
    let config = load(&dir, contents, &[]);

    let steps = config.steps(Phase::Release).unwrap();
    let types: Vec<&str> = steps.iter().map(|s| s.step_type.as_str()).collect();

    assert_eq!(types, ["tag_source", "docker", "gitlab", "increment_release"]);
    // The declared configuration rides along in the fixed slot.
    assert!(steps[2].field_flag("publish_artifacts"));
}

#[test]
fn writes_persist_declared_values_but_never_defaults() {
    let dir = TempDir::new().unwrap();
    let mut config = load(&dir, MINIMAL, &[]);

    config.set(Phase::Project, "version", json!("2.0.0"));
    config.write().unwrap();

    let text = std::fs::read_to_string(config.path()).unwrap();
    assert!(text.contains("2.0.0"));
    assert!(!text.contains("build_artifacts"));

    let reloaded = ProjectConfig::load(dir.path(), &EnvOverlay::default()).unwrap();
    assert_eq!(reloaded.version().unwrap(), "2.0.0");
}

#[test]
fn the_build_number_variable_is_itself_configurable() {
    let dir = TempDir::new().unwrap();
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\n  build_num_var: MY_BUILD\n";
    let config = load(&dir, contents, &[("MY_BUILD", "42"), ("VJER_BUILD_NUM", "9")]);

    assert_eq!(config.build_num().unwrap(), "42");
    assert_eq!(
        config.get_str(Phase::Build, "build_version").unwrap(),
        "1.2.3-42"
    );
}

#[test]
fn legacy_repository_names_alias_the_current_keys() {
    let dir = TempDir::new().unwrap();
    let contents = "schema: 3\nproject:\n  name: app\n  version: 1.2.3\n  docker_repo:\n    type: gcp\n    name: gcr.io/proj\n  helm_repo:\n    type: chartmuseum\n    name: stable\n";
    let config = load(&dir, contents, &[]);

    let registry = config.get(Phase::Project, "container_registry").unwrap();
    assert_eq!(registry["type"], "gcp");
    let chart_repo = config.get(Phase::Project, "chart_repo").unwrap();
    assert_eq!(chart_repo["name"], "stable");
}
