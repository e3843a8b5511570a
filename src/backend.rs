//! IDE project descriptor generation.
//!
//! After assembly the sorted component list can be handed to a backend that
//! writes a per-IDE project description. Backends are registered under a
//! target id; dispatch on an unknown id warns and moves on, so a build with
//! a mistyped target still produces its firmware.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::build::Environment;
use crate::registry::Component;

/// Target ids for which the exported tree can regenerate project files.
pub const PROJECT_TARGETS: &[&str] = &["mdk4", "mdk5", "iar", "vs", "vs2012", "cdk"];

/// A generator of IDE or build-system project descriptions.
pub trait ProjectBackend {
    /// Emit the project description for `components`.
    ///
    /// Components arrive name-sorted, so emitted files are stable across
    /// runs.
    fn emit(&self, components: &[&Component], env: &Environment) -> Result<()>;
}

/// Target-id keyed backend table.
#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn ProjectBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: impl Into<String>, backend: Box<dyn ProjectBackend>) {
        self.backends.insert(target.into(), backend);
    }

    pub fn known_targets(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    /// Run the backend registered for `target`.
    ///
    /// An unregistered target is not an error; the firmware build already
    /// succeeded by the time project generation runs.
    pub fn dispatch(&self, target: &str, env: &Environment) -> Result<()> {
        let backend = match self.backends.get(target) {
            Some(backend) => backend,
            None => {
                warn!(
                    "no project backend for target '{}' (known: {})",
                    target,
                    self.known_targets().join(", ")
                );
                return Ok(());
            }
        };

        info!("generating '{}' project files", target);
        backend.emit(&env.registry.sorted(), env)
    }
}

/// Backend that dumps the sorted component list as a JSON document, for
/// external tooling that builds its own project files from it.
pub struct JsonExportBackend {
    pub out_file: PathBuf,
}

impl JsonExportBackend {
    pub fn new(out_file: impl Into<PathBuf>) -> Self {
        Self {
            out_file: out_file.into(),
        }
    }
}

impl ProjectBackend for JsonExportBackend {
    fn emit(&self, components: &[&Component], _env: &Environment) -> Result<()> {
        write_json(&self.out_file, components)
    }
}

fn write_json(path: &Path, components: &[&Component]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = fs::File::create(path)
        .with_context(|| format!("cannot create project export '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, components)?;

    Ok(())
}
