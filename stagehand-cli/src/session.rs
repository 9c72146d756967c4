//! Per-invocation session wiring: locate the manifest, build the registry
//! and service descriptors, and load the administrator overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use stagehand_core::{
    Environment, OverrideStore, PropertyRegistry, Resolution, ServiceDescriptor,
};
use stagehand_render::PropertyScope;
use stagehand_resolve::{props_file, resolve, ResolveError};
use stagehand_supervisor::{ProcessSupervisor, SupervisorConfig};

use crate::manifest::{self, Settings};

pub const MANIFEST_ENV: &str = "STAGEHAND_MANIFEST";
pub const DEFAULT_MANIFEST: &str = "stagehand.yaml";

/// Everything the subcommands share: registry, descriptors, overrides, and
/// the paths they came from.
#[derive(Debug)]
pub struct Session {
    pub manifest_dir: PathBuf,
    pub registry: PropertyRegistry,
    pub services: Vec<ServiceDescriptor>,
    pub environment: Environment,
    pub overrides: OverrideStore,
    pub overrides_path: PathBuf,
    /// Lenient-load notes about saved overrides that no longer apply.
    pub load_warnings: Vec<String>,
    settings: Settings,
}

impl Session {
    /// Open the manifest (explicit path, `$STAGEHAND_MANIFEST`, or
    /// `./stagehand.yaml`) and load everything the commands need.
    pub fn open(manifest_arg: Option<&Path>) -> Result<Self> {
        let manifest_path = locate_manifest(manifest_arg)?;
        let manifest = manifest::load(&manifest_path)?;
        let manifest_dir = manifest_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let registry = manifest.build_registry()?;
        let services = manifest.build_services()?;
        let overrides_path = manifest_dir.join(&manifest.settings.overrides_file);
        let saved = props_file::load(&overrides_path)?;
        let (overrides, load_warnings) = OverrideStore::from_saved(&registry, &saved);

        Ok(Self {
            manifest_dir,
            registry,
            services,
            environment: Environment::capture(),
            overrides,
            overrides_path,
            load_warnings,
            settings: manifest.settings,
        })
    }

    /// Re-read the overrides file. Call while holding the file lock, before
    /// a read-modify-write.
    pub fn reload_overrides(&mut self) -> Result<()> {
        let saved = props_file::load(&self.overrides_path)?;
        let (overrides, load_warnings) = OverrideStore::from_saved(&self.registry, &saved);
        self.overrides = overrides;
        self.load_warnings = load_warnings;
        Ok(())
    }

    /// Persist the current overrides. The caller holds the file lock.
    pub fn save_overrides(&self) -> Result<()> {
        props_file::save(&self.overrides_path, &self.overrides.to_saved()).with_context(|| {
            format!("could not save overrides to {}", self.overrides_path.display())
        })
    }

    /// Run the full resolution pipeline over the current overrides.
    pub fn resolve(&self) -> Result<Resolution, ResolveError> {
        resolve(&self.registry, &self.overrides, &self.environment)
    }

    /// The supervisor state directory. The manifest value is a template, so
    /// packagers can point it at a resolved property.
    pub fn state_dir(&self, resolution: &Resolution) -> Result<PathBuf> {
        let scope = PropertyScope::from_resolution(resolution);
        let rendered = scope
            .render(&self.settings.state_dir)
            .context("state_dir in manifest settings")?;
        let path = PathBuf::from(rendered);
        Ok(if path.is_absolute() {
            path
        } else {
            self.manifest_dir.join(path)
        })
    }

    /// A supervisor over this session's services and the given resolution.
    pub fn supervisor(&self, resolution: &Resolution) -> Result<ProcessSupervisor> {
        let mut config = SupervisorConfig::new(self.state_dir(resolution)?);
        config.ready_timeout = Duration::from_secs(self.settings.ready_timeout_secs);
        config.stop_grace = Duration::from_secs(self.settings.stop_grace_secs);
        Ok(ProcessSupervisor::new(
            config,
            self.services.iter().cloned(),
            resolution.clone(),
        ))
    }
}

fn locate_manifest(arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = arg {
        if !path.exists() {
            bail!("manifest {} does not exist", path.display());
        }
        return Ok(path.to_path_buf());
    }
    if let Some(from_env) = std::env::var_os(MANIFEST_ENV) {
        if !from_env.is_empty() {
            return Ok(PathBuf::from(from_env));
        }
    }
    let default = PathBuf::from(DEFAULT_MANIFEST);
    if default.exists() {
        return Ok(default);
    }
    bail!("no manifest found: pass --manifest <path>, set {MANIFEST_ENV}, or create ./{DEFAULT_MANIFEST}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write_manifest(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("stagehand.yaml");
        fs::write(&path, text).expect("write manifest");
        path
    }

    #[test]
    fn open_builds_registry_services_and_override_paths() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_manifest(
            dir.path(),
            "
properties:
  - name: web.port
    default: 8080
services:
  - name: web
    command: [\"/bin/true\"]
",
        );

        let session = Session::open(Some(&path)).expect("open");
        assert_eq!(session.registry.len(), 1);
        assert_eq!(session.services.len(), 1);
        assert_eq!(session.overrides_path, dir.path().join("overrides.props"));
        assert!(session.overrides.is_empty());
        assert!(session.load_warnings.is_empty());
    }

    #[test]
    fn explicit_missing_manifest_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("nope.yaml");
        let err = Session::open(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn state_dir_renders_templates_and_joins_relative_paths() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_manifest(
            dir.path(),
            "
properties:
  - name: run.name
    default: blue
settings:
  state_dir: \"state-{{ run.name }}\"
",
        );

        let session = Session::open(Some(&path)).expect("open");
        let resolution = session.resolve().expect("resolve");
        let state_dir = session.state_dir(&resolution).expect("state dir");
        assert_eq!(state_dir, dir.path().join("state-blue"));
    }

    #[test]
    fn saved_overrides_load_into_the_session() {
        let dir = TempDir::new().expect("tempdir");
        let path = write_manifest(
            dir.path(),
            "
properties:
  - name: web.port
    default: 8080
",
        );
        fs::write(dir.path().join("overrides.props"), "web.port=9090\nstale.key=1\n")
            .expect("write overrides");

        let session = Session::open(Some(&path)).expect("open");
        assert_eq!(
            session.overrides.get("web.port"),
            Some(&stagehand_core::PropertyValue::Int(9090))
        );
        assert_eq!(session.load_warnings.len(), 1, "stale key is a warning");
    }
}
