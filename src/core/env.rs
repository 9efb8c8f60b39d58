//! Read-only environment overlay.
//!
//! The process environment is captured once at startup and never mutated.
//! Project-level environment entries extend the snapshot into a new overlay;
//! expansion and spawned commands read from the overlay, so every consumer
//! sees the same values for the lifetime of the run.

use std::collections::BTreeMap;
use std::process::Command;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct EnvOverlay {
    vars: BTreeMap<String, String>,
}

impl EnvOverlay {
    /// Snapshot the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Overlay with only the given variables. Test constructor; production
    /// code starts from `from_process`.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// New overlay with `extra` merged on top of this one.
    pub fn extended<I, K, V>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars = self.vars.clone();
        for (k, v) in extra {
            vars.insert(k.into(), v.into());
        }
        Self { vars }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get(name).unwrap_or(default)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Variable that must be present, reported by name when it is not.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name)
            .ok_or_else(|| Error::config_invalid_value(name, "required environment variable is not set"))
    }

    /// Export the overlay into a command about to be spawned.
    pub fn apply_to(&self, command: &mut Command) {
        command.envs(&self.vars);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_overrides_and_adds() {
        let base = EnvOverlay::from_vars([("A", "1"), ("B", "2")]);
        let overlay = base.extended([("B", "changed"), ("C", "3")]);
        assert_eq!(overlay.get("A"), Some("1"));
        assert_eq!(overlay.get("B"), Some("changed"));
        assert_eq!(overlay.get("C"), Some("3"));
        // The source overlay is untouched.
        assert_eq!(base.get("B"), Some("2"));
        assert!(!base.is_set("C"));
    }

    #[test]
    fn get_or_falls_back() {
        let overlay = EnvOverlay::from_vars([("SET", "yes")]);
        assert_eq!(overlay.get_or("SET", "no"), "yes");
        assert_eq!(overlay.get_or("UNSET", "no"), "no");
    }

    #[test]
    fn require_names_the_missing_variable() {
        let overlay = EnvOverlay::from_vars([("SET", "yes")]);
        assert_eq!(overlay.require("SET").unwrap(), "yes");
        let err = overlay.require("CI_JOB_ID").unwrap_err();
        assert!(err.message.contains("CI_JOB_ID"));
    }

    #[test]
    fn apply_to_exports_variables() {
        let overlay = EnvOverlay::from_process().extended([("VJER_OVERLAY_PROBE", "visible")]);
        let mut command = Command::new("sh");
        command.args(["-c", "printf %s \"$VJER_OVERLAY_PROBE\""]);
        overlay.apply_to(&mut command);
        let output = command.output().expect("spawn sh");
        assert_eq!(String::from_utf8_lossy(&output.stdout), "visible");
    }
}
