//! Build session state and target assembly.
//!
//! An [`Environment`] is the explicit context of one build invocation: the
//! two project roots, the parsed option store, the growing component
//! registry and the attribute environment shared by all default-environment
//! sources. It is passed by reference through every stage; there is no
//! process-wide state.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{Options, Predicate};
use crate::graph::DepNode;
use crate::registry::{self, BuildAttrs, Component, Registry};
use crate::utils::PathExt;

/// Default filename of the build info dump consumed by `fwdist`.
pub const BUILD_INFO_FILENAME: &str = "fwbuild-build.json";

/// Compiler family driving library naming and flag patching.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Toolchain {
    Gcc,
    Armcc,
    Iar,
}

impl Toolchain {
    /// File name of the static library built for `component`.
    ///
    /// armcc uses no `lib` prefix and a `.lib` suffix; the compiler suffix in
    /// the stem keeps libraries built by different toolchains apart.
    pub fn lib_file_name(self, component: &str) -> String {
        match self {
            Toolchain::Gcc => format!("lib{}_gcc.a", component),
            Toolchain::Armcc => format!("{}_rvds.lib", component),
            Toolchain::Iar => format!("{}.a", component),
        }
    }
}

/// Board-specific packaging hook, run against the BSP root before the
/// framework tree is assembled into an export.
pub type DistHook = Box<dyn Fn(&Path) -> Result<()>>;

/// The build-session context.
pub struct Environment {
    /// Root of the active board support package.
    pub bsp_root: PathBuf,
    /// Root of the shared firmware framework tree.
    pub fw_root: PathBuf,
    pub options: Options,
    pub toolchain: Toolchain,
    /// CPU architecture directory name under the CPU-abstraction layer.
    pub arch: String,
    /// CPU model directory name under the architecture directory.
    pub cpu: String,
    /// Vendor library flavor of the active board family, when it has one.
    pub board_lib_type: Option<String>,
    pub dist_hook: Option<DistHook>,
    pub registry: Registry,
    /// Attribute environment shared by all default-environment sources.
    pub globals: BuildAttrs,
}

impl Environment {
    pub fn new(
        bsp_root: impl Into<PathBuf>,
        fw_root: impl Into<PathBuf>,
        options: Options,
        toolchain: Toolchain,
    ) -> Self {
        Self {
            bsp_root: bsp_root.into(),
            fw_root: fw_root.into(),
            options,
            toolchain,
            arch: String::new(),
            cpu: String::new(),
            board_lib_type: None,
            dist_hook: None,
            registry: Registry::new(),
            globals: BuildAttrs::new(),
        }
    }

    #[must_use]
    pub fn with_arch(mut self, arch: impl Into<String>, cpu: impl Into<String>) -> Self {
        self.arch = arch.into();
        self.cpu = cpu.into();
        self
    }

    #[must_use]
    pub fn with_board_lib_type(mut self, lib_type: impl Into<String>) -> Self {
        self.board_lib_type = Some(lib_type.into());
        self
    }

    #[must_use]
    pub fn with_dist_hook(mut self, hook: DistHook) -> Self {
        self.dist_hook = Some(hook);
        self
    }

    /// Register a component for the sources under `dir`.
    ///
    /// Returns the absolute source paths that became part of the build.
    /// When `predicate` is inactive the result is empty and nothing is
    /// mutated at all.
    ///
    /// Include paths (global and local) are resolved relative to `dir`,
    /// since registration happens from varying working directories across
    /// subdirectories. Non-local attributes are folded into the shared
    /// default environment with append-unique semantics, while the component
    /// itself keeps the verbatim lists for merging and backends.
    pub fn add_component(
        &mut self,
        name: &str,
        dir: impl AsRef<Path>,
        sources: impl IntoIterator<Item = impl AsRef<Path>>,
        predicate: &Predicate,
        mut attrs: BuildAttrs,
    ) -> Vec<PathBuf> {
        if !self.options.evaluate(predicate).is_active() {
            debug!("component '{}' gated out by {:?}", name, predicate);
            return Vec::new();
        }

        let dir = dir.as_ref();

        attrs.include_paths = attrs
            .include_paths
            .iter()
            .map(|p| p.abspath_relative_to(dir))
            .collect();
        attrs.local_include_paths = attrs
            .local_include_paths
            .iter()
            .map(|p| p.abspath_relative_to(dir))
            .collect();

        if self.toolchain == Toolchain::Gcc {
            registry::patch_gcc_dialect(&mut attrs.cflags);
            registry::patch_gcc_dialect(&mut attrs.local_cflags);
        }

        let sources: Vec<PathBuf> = sources
            .into_iter()
            .map(|s| s.as_ref().abspath_relative_to(dir))
            .collect();

        self.globals.append_unique(&attrs);

        self.registry.insert(Component {
            name: name.to_owned(),
            path: dir.to_owned(),
            sources: sources.clone(),
            attrs,
        });

        sources
    }
}

/// Terminal build modes of the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildMode {
    /// Link every component into one program artifact with this file name.
    Program(String),
    /// Build exactly the named component into a standalone static library.
    Library(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Program,
    StaticLib,
}

/// The final link product of a build plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    /// Post-build copy destination; set for library builds, which install
    /// the archive at the component's canonical path.
    pub install_to: Option<PathBuf>,
}

/// One individually-compiled source and the flag set it is compiled with.
///
/// Local flags extend the global ones, they never replace them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSpec {
    pub source: PathBuf,
    pub cflags: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub asflags: Vec<String>,
}

/// Result of partitioning the registry into compilation work.
#[derive(Debug)]
pub struct BuildPlan {
    /// Sources compiled together under the shared default environment.
    pub default_sources: Vec<PathBuf>,
    /// Sources compiled individually with `global ++ local` flags.
    pub local_objects: Vec<ObjectSpec>,
    pub artifact: Artifact,
}

/// Partition the registered components into a [`BuildPlan`].
///
/// Components are processed in name order. In program mode every source
/// lands in the default set first; a second pass pulls the sources of any
/// component declaring local overrides back out for individual compilation.
/// In library mode an unknown component name is a configuration error.
pub fn assemble(env: &Environment, mode: &BuildMode) -> Result<BuildPlan> {
    let components = env.registry.sorted();

    match mode {
        BuildMode::Library(name) => {
            let component = env.registry.get(name).with_context(|| {
                format!("component '{}' is not registered; cannot build it as a library", name)
            })?;

            let file_name = env.toolchain.lib_file_name(&component.name);
            let artifact = Artifact {
                kind: ArtifactKind::StaticLib,
                install_to: Some(component.path.join(&file_name)),
                file_name,
            };

            if component.attrs.has_local() {
                Ok(BuildPlan {
                    default_sources: Vec::new(),
                    local_objects: local_specs(env, component),
                    artifact,
                })
            } else {
                Ok(BuildPlan {
                    default_sources: component.sources.clone(),
                    local_objects: Vec::new(),
                    artifact,
                })
            }
        }
        BuildMode::Program(target) => {
            let mut default_sources: Vec<PathBuf> = components
                .iter()
                .flat_map(|c| c.sources.iter().cloned())
                .collect();

            let mut local_objects = Vec::new();
            for component in components {
                if !component.attrs.has_local() {
                    continue;
                }

                default_sources.retain(|s| !component.sources.contains(s));
                local_objects.extend(local_specs(env, component));
            }

            Ok(BuildPlan {
                default_sources,
                local_objects,
                artifact: Artifact {
                    kind: ArtifactKind::Program,
                    file_name: target.clone(),
                    install_to: None,
                },
            })
        }
    }
}

fn local_specs(env: &Environment, component: &Component) -> Vec<ObjectSpec> {
    let globals = &env.globals;
    let attrs = &component.attrs;

    component
        .sources
        .iter()
        .map(|source| ObjectSpec {
            source: source.clone(),
            cflags: concat(&globals.cflags, &attrs.local_cflags),
            include_paths: concat(&globals.include_paths, &attrs.local_include_paths),
            defines: concat(&globals.defines, &attrs.local_defines),
            asflags: concat(&globals.asflags, &attrs.local_asflags),
        })
        .collect()
}

fn concat<T: Clone>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    out.extend_from_slice(a);
    out.extend_from_slice(b);
    out
}

/// Remove stale build products with one of `extensions` from `out_dir`.
///
/// A missing output directory is a no-op.
pub fn clean_artifacts(out_dir: impl AsRef<Path>, extensions: &[&str]) -> Result<()> {
    let out_dir = out_dir.as_ref();
    if !out_dir.is_dir() {
        return Ok(());
    }

    for entry in fs::read_dir(out_dir)? {
        let path = entry?.path();
        let stale = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| extensions.contains(&e))
            .unwrap_or(false);

        if stale && path.is_file() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove '{}'", path.display()))?;
        }
    }

    Ok(())
}

/// Everything `fwdist` needs to package a finished build, dumped as JSON
/// next to the build outputs.
#[derive(Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub bsp_root: PathBuf,
    pub fw_root: PathBuf,
    /// Configuration header the option store was parsed from.
    pub config_header: PathBuf,
    pub toolchain: Toolchain,
    pub arch: String,
    pub cpu: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_lib_type: Option<String>,
    /// Dependency graph of the build, one root per top-level artifact.
    pub graph: Vec<DepNode>,
}

impl BuildInfo {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = fs::File::create(path)
            .with_context(|| format!("cannot create build info file '{}'", path.display()))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path)
            .with_context(|| format!("cannot open build info file '{}'", path.display()))?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Reconstruct a build-session [`Environment`] from this dump.
    pub fn environment(&self) -> Result<Environment> {
        let options = Options::from_file(&self.config_header)?;

        let mut env = Environment::new(
            self.bsp_root.clone(),
            self.fw_root.clone(),
            options,
            self.toolchain,
        )
        .with_arch(self.arch.clone(), self.cpu.clone());

        if let Some(lib_type) = &self.board_lib_type {
            env = env.with_board_lib_type(lib_type.clone());
        }

        Ok(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionValue;

    fn test_env(options: Options) -> Environment {
        Environment::new("/bsp", "/os", options, Toolchain::Gcc).with_arch("arm", "cortex-m4")
    }

    fn options_with_x() -> Options {
        Options::parse("#define X 1\n")
    }

    #[test]
    fn gated_component_is_never_registered() {
        // Option store = {}: component A (predicate "X") must not register,
        // component B (always) must.
        let mut env = test_env(Options::new());

        let a = env.add_component(
            "A",
            "/os/a",
            ["a.c"],
            &Predicate::single("X"),
            BuildAttrs::new().with_defines(["A"]),
        );
        let b = env.add_component("B", "/os/b", ["b.c"], &Predicate::Always, BuildAttrs::new());

        assert!(a.is_empty());
        assert_eq!(b, vec![PathBuf::from("/os/b/b.c")]);
        assert!(env.registry.get("A").is_none());
        assert!(env.registry.get("B").is_some());
        // no partial side effects: the gated component's defines are absent
        assert!(env.globals.defines.is_empty());

        let plan = assemble(&env, &BuildMode::Program("firmware.elf".into())).unwrap();
        assert_eq!(plan.default_sources, vec![PathBuf::from("/os/b/b.c")]);
    }

    #[test]
    fn active_predicate_scenario() {
        // Option store = {X: 1}: both A and B compile and link together.
        let mut env = test_env(options_with_x());

        env.add_component("A", "/os/a", ["a.c"], &Predicate::single("X"), BuildAttrs::new());
        env.add_component("B", "/os/b", ["b.c"], &Predicate::Always, BuildAttrs::new());

        let plan = assemble(&env, &BuildMode::Program("firmware.elf".into())).unwrap();
        assert_eq!(
            plan.default_sources,
            vec![PathBuf::from("/os/a/a.c"), PathBuf::from("/os/b/b.c")]
        );
        assert!(plan.local_objects.is_empty());
        assert_eq!(plan.artifact.kind, ArtifactKind::Program);
        assert_eq!(plan.artifact.file_name, "firmware.elf");
    }

    #[test]
    fn include_paths_are_absolutized() {
        let mut env = test_env(Options::new());
        env.add_component(
            "Drivers",
            "/os/drivers/serial",
            ["serial.c"],
            &Predicate::Always,
            BuildAttrs::new()
                .with_include_paths(["inc", "/abs/inc"])
                .with_local_include_paths(["local_inc"]),
        );

        let component = env.registry.get("Drivers").unwrap();
        assert_eq!(
            component.attrs.include_paths,
            vec![
                PathBuf::from("/os/drivers/serial/inc"),
                PathBuf::from("/abs/inc")
            ]
        );
        assert_eq!(
            component.attrs.local_include_paths,
            vec![PathBuf::from("/os/drivers/serial/local_inc")]
        );
    }

    #[test]
    fn gcc_dialect_patch_applies_on_registration() {
        let mut env = test_env(Options::new());
        env.add_component(
            "Kernel",
            "/os/kernel",
            ["clock.c"],
            &Predicate::Always,
            BuildAttrs::new().with_cflags("-std=c99 -O2"),
        );

        let component = env.registry.get("Kernel").unwrap();
        assert_eq!(component.attrs.cflags, vec!["-std=gnu99", "-O2"]);
    }

    #[test]
    fn local_overrides_extend_globals() {
        let mut env = test_env(Options::new());
        env.add_component(
            "Kernel",
            "/os/kernel",
            ["clock.c"],
            &Predicate::Always,
            BuildAttrs::new().with_cflags("-O2").with_defines(["GLOBAL"]),
        );
        env.add_component(
            "Gui",
            "/os/gui",
            ["widget.c", "theme.c"],
            &Predicate::Always,
            BuildAttrs::new()
                .with_local_cflags("-O0")
                .with_local_defines(["GUI_DEBUG"]),
        );

        let plan = assemble(&env, &BuildMode::Program("firmware.elf".into())).unwrap();

        // gui sources are pulled out of the default set
        assert_eq!(plan.default_sources, vec![PathBuf::from("/os/kernel/clock.c")]);
        assert_eq!(plan.local_objects.len(), 2);

        let widget = &plan.local_objects[0];
        assert_eq!(widget.source, PathBuf::from("/os/gui/widget.c"));
        assert_eq!(widget.cflags, vec!["-O2", "-O0"]);
        assert_eq!(widget.defines, vec!["GLOBAL", "GUI_DEBUG"]);
    }

    #[test]
    fn library_mode_unknown_component_fails() {
        let env = test_env(Options::new());
        assert!(assemble(&env, &BuildMode::Library("NoSuch".into())).is_err());
    }

    #[test]
    fn library_mode_installs_at_canonical_path() {
        let mut env = test_env(Options::new());
        env.add_component(
            "Shell",
            "/os/components/shell",
            ["shell.c"],
            &Predicate::Always,
            BuildAttrs::new(),
        );

        let plan = assemble(&env, &BuildMode::Library("Shell".into())).unwrap();
        assert_eq!(plan.artifact.kind, ArtifactKind::StaticLib);
        assert_eq!(plan.artifact.file_name, "libShell_gcc.a");
        assert_eq!(
            plan.artifact.install_to,
            Some(PathBuf::from("/os/components/shell/libShell_gcc.a"))
        );
        assert_eq!(plan.default_sources, vec![PathBuf::from("/os/components/shell/shell.c")]);
    }

    #[test]
    fn lib_naming_per_toolchain() {
        assert_eq!(Toolchain::Gcc.lib_file_name("Shell"), "libShell_gcc.a");
        assert_eq!(Toolchain::Armcc.lib_file_name("Shell"), "Shell_rvds.lib");
        assert_eq!(Toolchain::Iar.lib_file_name("Shell"), "Shell.a");
    }

    #[test]
    fn build_info_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let config = tmp.path().join("os_config.h");
        std::fs::write(&config, "#define X 1\n").unwrap();

        let info = BuildInfo {
            bsp_root: "/bsp".into(),
            fw_root: "/os".into(),
            config_header: config,
            toolchain: Toolchain::Gcc,
            arch: "arm".into(),
            cpu: "cortex-m4".into(),
            board_lib_type: Some("STM32L4xx_HAL".into()),
            graph: vec![DepNode::leaf("/bsp/out/firmware.elf")],
        };

        let path = tmp.path().join(BUILD_INFO_FILENAME);
        info.save(&path).unwrap();
        let loaded = BuildInfo::load(&path).unwrap();

        assert_eq!(loaded.bsp_root, info.bsp_root);
        assert_eq!(loaded.toolchain, Toolchain::Gcc);
        assert_eq!(loaded.graph, info.graph);

        let env = loaded.environment().unwrap();
        assert_eq!(env.options.get("X"), Some(&OptionValue::Int(1)));
        assert_eq!(env.board_lib_type.as_deref(), Some("STM32L4xx_HAL"));
    }

    #[test]
    fn stale_artifact_cleanup() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.bin"), "").unwrap();
        std::fs::write(tmp.path().join("old.map"), "").unwrap();
        std::fs::write(tmp.path().join("keep.c"), "").unwrap();

        clean_artifacts(tmp.path(), &["bin", "map"]).unwrap();

        assert!(!tmp.path().join("old.bin").exists());
        assert!(!tmp.path().join("old.map").exists());
        assert!(tmp.path().join("keep.c").exists());

        // missing directory is a no-op
        clean_artifacts(tmp.path().join("nope"), &["bin"]).unwrap();
    }
}
