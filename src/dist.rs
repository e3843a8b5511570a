//! Project export and tree minimization.
//!
//! [`make_dist`] turns a finished build into a self-contained project
//! directory under the board root: the board files, the framework tree (whole
//! or stripped down to what the build actually consumed) and a compressed
//! archive of the result. The stripped variant walks the recorded dependency
//! graph instead of guessing from the source layout, so a file lands in the
//! export iff the firmware was built from it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};

use crate::backend::PROJECT_TARGETS;
use crate::build::Environment;
use crate::cmd::Cmd;
use crate::fs::{copy_file, copy_tree, list_files};
use crate::graph::{collect_sources, DepNode};
use crate::utils::path_under;

/// Per-directory build descriptor consumed by the exported tree's build
/// entry point.
pub const DESCRIPTOR_FILE: &str = "SConscript";
/// Per-directory configuration declaration file.
pub const DECLARATION_FILE: &str = "Kconfig";
/// Build entry point at the board root.
pub const ENTRY_FILE: &str = "SConstruct";
/// Environment variable pointing the exported board at its framework tree.
pub const FW_ROOT_VAR: &str = "FW_ROOT";
/// Placeholder the declaration files use for the relocated framework tree.
pub const FW_DIR_VAR: &str = "$FW_DIR";
/// CPU abstraction layer directory under the framework root.
pub const CPU_LAYER_DIR: &str = "libcpu";
/// Toolchain libc shim, always exported wholesale.
pub const LIBC_SHIM_DIR: &str = "components/libc/compilers";
/// Sockets abstraction layer; exported wholesale when any of its files is
/// reachable from the build.
pub const SOCKETS_DIR: &str = "components/net/sal_socket";
/// Build tooling directory, required by the exported entry point.
pub const TOOLING_DIR: &str = "scripts";
/// Board family with vendor libraries living beside the board directories.
pub const VENDOR_FAMILY: &str = "stm32";

/// Board-root entries that never belong in an export.
const BSP_IGNORE: &[&str] = &[
    "build",
    "dist",
    "dist-strip",
    "*.pyc",
    "*.old",
    "*.map",
    "*.bin",
    "*.elf",
    "*.axf",
    ".sconsign.dblite",
    "cconfig.h",
];

/// Path segments whose declaration files are not swept into the export.
const DECL_SKIP_DIRS: &[&str] = &[".git", "scripts", "bsp"];

/// Framework-root files exported regardless of the dependency graph.
const TOP_ASSETS: &[&str] = &[
    "Kconfig",
    "AUTHORS",
    "COPYING",
    "LICENSE",
    "README.md",
    "README_zh.md",
];

/// Framework directories exported wholesale in full (non-stripped) mode.
const FULL_EXPORT_DIRS: &[&str] = &["components", "drivers", "include", "kernel", "thirdparty"];

/// Knobs of one export run.
#[derive(Debug, Clone)]
pub struct DistOptions {
    /// Minimize the framework tree to the sources the build consumed.
    pub strip: bool,
    /// Re-run the exported build entry point once per known IDE target.
    pub regenerate_projects: bool,
    /// Kill a hung project regeneration after this long.
    pub regen_timeout: Duration,
}

impl Default for DistOptions {
    fn default() -> Self {
        Self {
            strip: false,
            regenerate_projects: true,
            regen_timeout: Duration::from_secs(120),
        }
    }
}

/// Framework sources the stripped export keeps, derived from the dependency
/// graph.
#[derive(Debug)]
pub struct StrippedSources {
    /// Sorted absolute paths under the framework root.
    pub files: Vec<PathBuf>,
    /// Whether anything under the sockets layer was reachable.
    pub needs_sockets: bool,
}

/// Walk `roots` and partition the reachable sources for a stripped export.
///
/// Board files are dropped (the whole board directory is copied separately),
/// as are the CPU layer and the libc shim, which are exported wholesale.
/// Sockets-layer hits only raise the flag. Anything outside the framework
/// root is ignored.
pub fn stripped_sources(env: &Environment, roots: &[DepNode]) -> StrippedSources {
    let cpu_layer = env.fw_root.join(CPU_LAYER_DIR);
    let libc_shim = env.fw_root.join(LIBC_SHIM_DIR);
    let sockets = env.fw_root.join(SOCKETS_DIR);

    let mut files = Vec::new();
    let mut needs_sockets = false;

    for source in collect_sources(roots) {
        if path_under(&source, &env.bsp_root) {
            continue;
        }
        if path_under(&source, &cpu_layer) || path_under(&source, &libc_shim) {
            continue;
        }
        if path_under(&source, &sockets) {
            needs_sockets = true;
            continue;
        }
        if path_under(&source, &env.fw_root) {
            files.push(source);
        }
    }

    StrippedSources {
        files,
        needs_sockets,
    }
}

/// Export the build as a self-contained project under the board root.
///
/// Returns the export directory; a compressed archive of it is written next
/// to it.
pub fn make_dist(env: &Environment, graph: &[DepNode], opts: &DistOptions) -> Result<PathBuf> {
    if !env.bsp_root.is_dir() {
        bail!("board root '{}' does not exist", env.bsp_root.display());
    }
    if !env.fw_root.is_dir() {
        bail!("framework root '{}' does not exist", env.fw_root.display());
    }

    let bsp_name = dir_name(&env.bsp_root)?;
    let fw_name = dir_name(&env.fw_root)?;

    let dist_dir = env
        .bsp_root
        .join(if opts.strip { "dist-strip" } else { "dist" })
        .join(&bsp_name);
    let target_path = dist_dir.join(&fw_name);

    info!("exporting board '{}' to '{}'", bsp_name, dist_dir.display());
    copy_tree(&env.bsp_root, &dist_dir, BSP_IGNORE)?;

    copy_vendor_libraries(env, &dist_dir)?;

    if let Some(hook) = &env.dist_hook {
        info!("running board export hook");
        hook(&env.bsp_root)?;
    }

    if opts.strip {
        export_stripped(env, graph, &target_path)?;
    } else {
        export_full(env, &target_path)?;
    }

    rewrite_entry_file(&dist_dir, &fw_name)?;
    rewrite_declaration_file(&dist_dir, &fw_name)?;

    if opts.regenerate_projects {
        regenerate_projects(&dist_dir, &target_path, opts.regen_timeout);
    }

    let archive = archive_dist(&dist_dir)?;
    info!("export archived at '{}'", archive.display());

    Ok(dist_dir)
}

/// Copy the minimal framework tree for a stripped export.
fn export_stripped(env: &Environment, graph: &[DepNode], target_path: &Path) -> Result<()> {
    let sources = stripped_sources(env, graph);

    // Directory skeleton of the kept sources; each level may carry its own
    // build descriptor, picked up below via the missing-ok file copy.
    let mut copy_list = sources.files.clone();
    for dir in skeleton_dirs(&env.fw_root, &sources.files) {
        copy_list.push(env.fw_root.join(dir).join(DESCRIPTOR_FILE));
    }

    copy_list.extend(declaration_files(&env.fw_root)?);
    copy_list.sort();
    copy_list.dedup();

    for src in &copy_list {
        let rel = match src.strip_prefix(&env.fw_root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };

        debug!("=> {}", rel.display());
        copy_file(src, target_path.join(rel))?;
    }

    copy_tree(
        env.fw_root.join(LIBC_SHIM_DIR),
        target_path.join(LIBC_SHIM_DIR),
        &[],
    )?;

    if sources.needs_sockets {
        copy_tree(
            env.fw_root.join(SOCKETS_DIR),
            target_path.join(SOCKETS_DIR),
            &[],
        )?;
    }

    export_common(env, target_path)
}

/// Copy the whole framework tree, minus build residue.
fn export_full(env: &Environment, target_path: &Path) -> Result<()> {
    for dir in FULL_EXPORT_DIRS {
        copy_tree(env.fw_root.join(dir), target_path.join(dir), &["*.pyc"])?;
    }

    export_common(env, target_path)
}

/// The parts both export modes carry: tooling, top-level assets and the CPU
/// layer slice for the configured architecture.
fn export_common(env: &Environment, target_path: &Path) -> Result<()> {
    copy_tree(
        env.fw_root.join(TOOLING_DIR),
        target_path.join(TOOLING_DIR),
        &["*.pyc"],
    )?;

    for asset in TOP_ASSETS {
        copy_file(env.fw_root.join(asset), target_path.join(asset))?;
    }

    let cpu_layer = env.fw_root.join(CPU_LAYER_DIR);
    let cpu_target = target_path.join(CPU_LAYER_DIR);

    copy_tree(
        cpu_layer.join(&env.arch).join(&env.cpu),
        cpu_target.join(&env.arch).join(&env.cpu),
        &[],
    )?;
    copy_tree(
        cpu_layer.join(&env.arch).join("common"),
        cpu_target.join(&env.arch).join("common"),
        &[],
    )?;
    copy_file(
        cpu_layer.join(DECLARATION_FILE),
        cpu_target.join(DECLARATION_FILE),
    )?;
    copy_file(
        cpu_layer.join(DESCRIPTOR_FILE),
        cpu_target.join(DESCRIPTOR_FILE),
    )?;

    Ok(())
}

/// Relative directories containing `files`, including every intermediate
/// level up to the framework root.
fn skeleton_dirs(fw_root: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    for file in files {
        let rel = match file.strip_prefix(fw_root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };

        let mut level = PathBuf::new();
        for component in rel.parent().unwrap_or_else(|| Path::new("")).components() {
            level.push(component);
            if !dirs.contains(&level) {
                dirs.push(level.clone());
            }
        }
    }

    dirs
}

/// Every declaration file under `fw_root`, excluding tooling, board and VCS
/// directories. Both historical spellings of the file name are picked up.
fn declaration_files(fw_root: &Path) -> Result<Vec<PathBuf>> {
    let walker = globwalk::GlobWalkerBuilder::from_patterns(fw_root, &["**/Kconfig", "**/KConfig"])
        .follow_links(false)
        .build()?;

    let mut found = Vec::new();
    for entry in walker.filter_map(Result::ok) {
        let path = entry.path().to_owned();
        let rel = path.strip_prefix(fw_root).unwrap_or(&path);

        let skipped = rel
            .components()
            .any(|c| DECL_SKIP_DIRS.iter().any(|skip| c.as_os_str() == *skip));
        if !skipped {
            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

/// Copy the vendor libraries a board family keeps beside its boards.
fn copy_vendor_libraries(env: &Environment, dist_dir: &Path) -> Result<()> {
    let family_root = match env.bsp_root.parent() {
        Some(parent) if parent.file_name().map_or(false, |n| n == VENDOR_FAMILY) => parent,
        _ => return Ok(()),
    };

    let lib_type = env.board_lib_type.as_deref().with_context(|| {
        format!(
            "board family '{}' requires a vendor library flavor, but none is configured",
            VENDOR_FAMILY
        )
    })?;

    info!("copying '{}' vendor libraries", VENDOR_FAMILY);
    let library_path = family_root.join("libraries");
    let library_dir = dist_dir.join("libraries");

    copy_tree(
        library_path.join("HAL_Drivers"),
        library_dir.join("HAL_Drivers"),
        &[],
    )?;
    copy_tree(library_path.join(lib_type), library_dir.join(lib_type), &[])?;
    copy_file(
        library_path.join(DECLARATION_FILE),
        library_dir.join(DECLARATION_FILE),
    )?;

    Ok(())
}

/// Make the exported entry file default its framework root to the relocated
/// tree when the environment does not override it.
fn rewrite_entry_file(dist_dir: &Path, fw_name: &str) -> Result<()> {
    let path = dist_dir.join(ENTRY_FILE);
    if !path.is_file() {
        warn!("no '{}' at the exported board root", ENTRY_FILE);
        return Ok(());
    }

    let text = fs::read_to_string(&path)
        .with_context(|| format!("cannot read '{}'", path.display()))?;

    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.contains(FW_ROOT_VAR) && line.contains("sys.path") {
            out.push_str(&format!("# set {}\n", FW_ROOT_VAR));
            out.push_str(&format!(
                "if not os.getenv('{var}'):\n    {var} = os.path.normpath(os.getcwd() + '/{name}')\n\n",
                var = FW_ROOT_VAR,
                name = fw_name
            ));
        }
        out.push_str(line);
        out.push('\n');
    }

    fs::write(&path, out).with_context(|| format!("cannot write '{}'", path.display()))?;
    Ok(())
}

/// Point the exported board's declaration file at the relocated framework
/// tree: the first `default` after a framework-root mention becomes the
/// in-tree directory name, and relative up-references become the
/// placeholder variable.
fn rewrite_declaration_file(dist_dir: &Path, fw_name: &str) -> Result<()> {
    let path = dist_dir.join(DECLARATION_FILE);
    if !path.is_file() {
        return Ok(());
    }

    let text = fs::read_to_string(&path)
        .with_context(|| format!("cannot read '{}'", path.display()))?;

    let mut out = String::with_capacity(text.len());
    let mut found = false;
    for line in text.lines() {
        let mut line = line.to_owned();
        if line.contains(FW_ROOT_VAR) {
            found = true;
        }
        if found {
            if let Some(position) = line.find("default") {
                line = format!("{}default \"{}\"", &line[..position], fw_name);
                found = false;
            }
        }
        out.push_str(&line);
        out.push('\n');
    }

    let mut rewritten = String::with_capacity(out.len());
    let mut found = false;
    for line in out.lines() {
        let mut line = line.to_owned();
        if line.contains(FW_ROOT_VAR) {
            found = true;
        }
        if found && line.contains("../..") {
            line = line.replace("../..", FW_DIR_VAR);
        }
        rewritten.push_str(&line);
        rewritten.push('\n');
    }

    fs::write(&path, rewritten).with_context(|| format!("cannot write '{}'", path.display()))?;
    Ok(())
}

/// Re-run the exported build entry point once per known IDE target so the
/// shipped project files match the exported tree.
///
/// Failures and hangs are reported but never abort the export; the tree
/// itself is already complete.
fn regenerate_projects(dist_dir: &Path, target_path: &Path, timeout: Duration) {
    for target in PROJECT_TARGETS {
        let mut cmd = Cmd::new("scons");
        cmd.arg(format!("--target={}", target))
            .current_dir(dist_dir)
            .env(FW_ROOT_VAR, target_path);

        match cmd.run_with_timeout(timeout) {
            Ok(()) => info!("updated '{}' project", target),
            Err(e) => warn!("skipping '{}' project regeneration: {}", target, e),
        }
    }
}

/// Compress `dist_dir` into a `.tar.gz` beside it, with entry names rooted
/// at the export's directory name so unpacking recreates it in place.
pub fn archive_dist(dist_dir: &Path) -> Result<PathBuf> {
    let base = dist_dir
        .parent()
        .with_context(|| format!("export directory '{}' has no parent", dist_dir.display()))?;

    // Append to the full directory name; with_extension would truncate
    // board names containing a dot.
    let mut archive_name = dist_dir.as_os_str().to_owned();
    archive_name.push(".tar.gz");
    let archive_path = PathBuf::from(archive_name);

    let file = fs::File::create(&archive_path)
        .with_context(|| format!("cannot create archive '{}'", archive_path.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for path in list_files(dist_dir)? {
        let name = path.strip_prefix(base)?;
        builder.append_path_with_name(&path, name)?;
    }

    builder.into_inner()?.finish()?;
    Ok(archive_path)
}

fn dir_name(path: &Path) -> Result<String> {
    Ok(path
        .file_name()
        .with_context(|| format!("'{}' has no directory name", path.display()))?
        .to_string_lossy()
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::Toolchain;
    use crate::config::Options;

    fn write(path: PathBuf, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// A miniature board plus framework checkout.
    fn fixture(root: &Path) -> Environment {
        let fw = root.join("os");
        write(fw.join("Kconfig"), "mainmenu \"Firmware\"\n");
        write(fw.join("README.md"), "# firmware\n");
        write(fw.join("kernel/clock.c"), "void clock(void) {}\n");
        write(fw.join("kernel/SConscript"), "# kernel descriptor\n");
        write(fw.join("include/os.h"), "#define OS 1\n");
        write(fw.join("libcpu/arm/cortex-m4/context.S"), ".text\n");
        write(fw.join("libcpu/arm/common/div0.c"), "void div0(void) {}\n");
        write(fw.join("libcpu/Kconfig"), "# cpu config\n");
        write(fw.join("libcpu/SConscript"), "# cpu descriptor\n");
        write(fw.join("components/libc/compilers/gcc/gcc.c"), "int g;\n");
        write(fw.join("components/net/sal_socket/socket.c"), "int s;\n");
        write(fw.join("drivers/serial/serial.c"), "int unused;\n");
        write(fw.join("drivers/serial/Kconfig"), "config SERIAL\n");
        write(fw.join("scripts/helper.py"), "pass\n");
        write(fw.join("scripts/helper.pyc"), "\x00");

        let bsp = root.join("boards/pandora");
        write(
            bsp.join("SConstruct"),
            "import os\nimport sys\nsys.path = sys.path + [os.path.join(FW_ROOT, 'scripts')]\n",
        );
        write(
            bsp.join("Kconfig"),
            "config FW_ROOT\n    string\n    default \"../..\"\n",
        );
        write(bsp.join("main.c"), "int main(void) { return 0; }\n");
        write(bsp.join("build/stale.o"), "\x00");
        write(bsp.join("firmware.map"), "");

        Environment::new(&bsp, &fw, Options::new(), Toolchain::Gcc)
            .with_arch("arm", "cortex-m4")
    }

    fn fixture_graph(root: &Path) -> Vec<DepNode> {
        let fw = root.join("os");
        let bsp = root.join("boards/pandora");

        vec![DepNode::with_children(
            bsp.join("firmware.elf"),
            vec![
                DepNode::leaf(bsp.join("main.c")),
                DepNode::with_children(
                    fw.join("kernel/clock.c"),
                    vec![DepNode::leaf(fw.join("include/os.h"))],
                ),
                DepNode::leaf(fw.join("libcpu/arm/cortex-m4/context.S")),
                DepNode::leaf(fw.join("components/libc/compilers/gcc/gcc.c")),
                DepNode::leaf(fw.join("components/net/sal_socket/socket.c")),
            ],
        )]
    }

    fn no_regen(strip: bool) -> DistOptions {
        DistOptions {
            strip,
            regenerate_projects: false,
            ..DistOptions::default()
        }
    }

    #[test]
    fn source_partitioning() {
        let tmp = tempfile::tempdir().unwrap();
        let env = fixture(tmp.path());
        let graph = fixture_graph(tmp.path());

        let sources = stripped_sources(&env, &graph);

        assert!(sources.needs_sockets);
        assert_eq!(
            sources.files,
            vec![
                tmp.path().join("os/include/os.h"),
                tmp.path().join("os/kernel/clock.c"),
            ]
        );
    }

    #[test]
    fn stripped_export() {
        let tmp = tempfile::tempdir().unwrap();
        let env = fixture(tmp.path());
        let graph = fixture_graph(tmp.path());

        let dist_dir = make_dist(&env, &graph, &no_regen(true)).unwrap();
        assert_eq!(
            dist_dir,
            tmp.path().join("boards/pandora/dist-strip/pandora")
        );

        // board files, minus build residue
        assert!(dist_dir.join("main.c").is_file());
        assert!(!dist_dir.join("build").exists());
        assert!(!dist_dir.join("firmware.map").exists());

        // reachable framework sources with their descriptors
        let target = dist_dir.join("os");
        assert!(target.join("kernel/clock.c").is_file());
        assert!(target.join("kernel/SConscript").is_file());
        assert!(target.join("include/os.h").is_file());

        // unreachable sources stay out, their declarations still come along
        assert!(!target.join("drivers/serial/serial.c").exists());
        assert!(target.join("drivers/serial/Kconfig").is_file());

        // wholesale layers
        assert!(target.join("libcpu/arm/cortex-m4/context.S").is_file());
        assert!(target.join("libcpu/arm/common/div0.c").is_file());
        assert!(target.join("libcpu/Kconfig").is_file());
        assert!(target.join("components/libc/compilers/gcc/gcc.c").is_file());
        assert!(target.join("components/net/sal_socket/socket.c").is_file());

        // tooling and top assets
        assert!(target.join("scripts/helper.py").is_file());
        assert!(!target.join("scripts/helper.pyc").exists());
        assert!(target.join("Kconfig").is_file());
        assert!(target.join("README.md").is_file());

        // entry file gained the framework-root default
        let entry = fs::read_to_string(dist_dir.join("SConstruct")).unwrap();
        assert!(entry.contains("# set FW_ROOT"));
        assert!(entry.contains("if not os.getenv('FW_ROOT')"));
        assert!(entry.contains("sys.path"));

        // declaration default now points into the export
        let decl = fs::read_to_string(dist_dir.join("Kconfig")).unwrap();
        assert!(decl.contains("default \"os\""));
        assert!(!decl.contains("../.."));

        // archive beside the export
        assert!(tmp
            .path()
            .join("boards/pandora/dist-strip/pandora.tar.gz")
            .is_file());
    }

    #[test]
    fn sockets_layer_needs_a_reachable_file() {
        let tmp = tempfile::tempdir().unwrap();
        let env = fixture(tmp.path());

        let graph = vec![DepNode::leaf(tmp.path().join("os/kernel/clock.c"))];
        let dist_dir = make_dist(&env, &graph, &no_regen(true)).unwrap();

        assert!(!dist_dir.join("os/components/net/sal_socket").exists());
    }

    #[test]
    fn full_export_keeps_unreachable_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let env = fixture(tmp.path());
        let graph = fixture_graph(tmp.path());

        let dist_dir = make_dist(&env, &graph, &no_regen(false)).unwrap();
        assert_eq!(dist_dir, tmp.path().join("boards/pandora/dist/pandora"));

        let target = dist_dir.join("os");
        assert!(target.join("drivers/serial/serial.c").is_file());
        assert!(target.join("kernel/clock.c").is_file());
        assert!(target.join("libcpu/arm/cortex-m4/context.S").is_file());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let env = fixture(tmp.path());
        let graph = fixture_graph(tmp.path());

        let dist_dir = make_dist(&env, &graph, &no_regen(true)).unwrap();
        let first: Vec<PathBuf> = list_files(&dist_dir)
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(&dist_dir).unwrap().to_owned())
            .collect();

        make_dist(&env, &graph, &no_regen(true)).unwrap();
        let second: Vec<PathBuf> = list_files(&dist_dir)
            .unwrap()
            .iter()
            .map(|p| p.strip_prefix(&dist_dir).unwrap().to_owned())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn dotted_board_names_keep_their_archive_name() {
        let tmp = tempfile::tempdir().unwrap();
        let mut env = fixture(tmp.path());

        let dotted_bsp = tmp.path().join("boards/pandora.v2");
        fs::rename(&env.bsp_root, &dotted_bsp).unwrap();
        env.bsp_root = dotted_bsp;

        let dist_dir = make_dist(&env, &fixture_graph(tmp.path()), &no_regen(true)).unwrap();
        assert_eq!(
            dist_dir,
            tmp.path().join("boards/pandora.v2/dist-strip/pandora.v2")
        );
        assert!(tmp
            .path()
            .join("boards/pandora.v2/dist-strip/pandora.v2.tar.gz")
            .is_file());
    }

    #[test]
    fn missing_roots_are_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let env = Environment::new(
            tmp.path().join("nope"),
            tmp.path().join("nada"),
            Options::new(),
            Toolchain::Gcc,
        );

        assert!(make_dist(&env, &[], &no_regen(true)).is_err());
    }

    #[test]
    fn vendor_family_requires_lib_flavor() {
        let tmp = tempfile::tempdir().unwrap();
        let mut env = fixture(tmp.path());

        // relocate the board under a vendor family directory
        let family_bsp = tmp.path().join("stm32/pandora");
        fs::create_dir_all(family_bsp.parent().unwrap()).unwrap();
        fs::rename(&env.bsp_root, &family_bsp).unwrap();
        env.bsp_root = family_bsp;

        let graph = fixture_graph(tmp.path());
        assert!(make_dist(&env, &graph, &no_regen(true)).is_err());

        write(
            tmp.path().join("stm32/libraries/HAL_Drivers/hal.c"),
            "int h;\n",
        );
        write(
            tmp.path().join("stm32/libraries/STM32L4xx_HAL/hal.h"),
            "#define H\n",
        );
        env = env.with_board_lib_type("STM32L4xx_HAL");

        // graph still points at the old board path; board sources are
        // excluded either way
        let dist_dir = make_dist(&env, &graph, &no_regen(true)).unwrap();
        assert!(dist_dir.join("libraries/HAL_Drivers/hal.c").is_file());
        assert!(dist_dir
            .join("libraries/STM32L4xx_HAL/hal.h")
            .is_file());
    }
}
