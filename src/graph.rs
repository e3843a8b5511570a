//! Build dependency graph traversal.
//!
//! The build step records, for the final program and every object feeding
//! it, which inputs produced it. The packager only ever walks this graph;
//! it never builds it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Source-file kinds recognized by the walker, keyed by file extension.
///
/// Anything else reachable from the graph (objects, libraries, linker
/// scripts) is traversed but not collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum SourceType {
    #[strum(serialize = "c")]
    C,
    #[strum(serialize = "h")]
    Header,
    #[strum(serialize = "s", serialize = "S")]
    Asm,
    #[strum(serialize = "cpp")]
    Cpp,
    /// GUI pixmap resources compiled into the image.
    #[strum(serialize = "xpm")]
    Resource,
}

impl SourceType {
    /// Classify `path` by extension, [`None`] for unrecognized ones.
    pub fn of(path: impl AsRef<Path>) -> Option<SourceType> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| SourceType::from_str(ext).ok())
    }
}

/// One build artifact and the inputs that produced it.
///
/// The graph is a DAG rooted at the program node; shared headers appear as
/// children of many nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DepNode {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DepNode>,
}

impl DepNode {
    pub fn leaf(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(path: impl Into<PathBuf>, children: Vec<DepNode>) -> Self {
        Self {
            path: path.into(),
            children,
        }
    }
}

/// Every recognized source file reachable from `roots`.
///
/// The result is deduplicated and sorted by construction, and the traversal
/// is idempotent: walking the same graph twice yields the same set. Revisits
/// are no-ops via a visited set keyed by path, which also bounds the
/// recursion should a vendored header graph ever round-trip.
pub fn collect_sources(roots: &[DepNode]) -> BTreeSet<PathBuf> {
    let mut visited = BTreeSet::new();
    let mut sources = BTreeSet::new();

    for root in roots {
        walk(root, &mut visited, &mut sources);
    }

    sources
}

fn walk(node: &DepNode, visited: &mut BTreeSet<PathBuf>, out: &mut BTreeSet<PathBuf>) {
    if !visited.insert(node.path.clone()) {
        return;
    }

    if SourceType::of(&node.path).is_some() {
        out.insert(node.path.clone());
    }

    for child in &node.children {
        walk(child, visited, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> Vec<DepNode> {
        let os_h = DepNode::leaf("/os/include/os.h");
        vec![DepNode::with_children(
            "/bsp/out/firmware.elf",
            vec![
                DepNode::with_children(
                    "/bsp/build/kernel/clock.o",
                    vec![
                        DepNode::with_children("/os/kernel/clock.c", vec![os_h.clone()]),
                        DepNode::leaf("/os/kernel/clock.d"),
                    ],
                ),
                DepNode::with_children(
                    "/bsp/build/libcpu/context.o",
                    vec![DepNode::leaf("/os/libcpu/arm/context.S"), os_h],
                ),
                DepNode::leaf("/bsp/board/link.lds"),
            ],
        )]
    }

    #[test]
    fn classification() {
        assert_eq!(SourceType::of("a/b.c"), Some(SourceType::C));
        assert_eq!(SourceType::of("a/b.h"), Some(SourceType::Header));
        assert_eq!(SourceType::of("a/b.s"), Some(SourceType::Asm));
        assert_eq!(SourceType::of("a/b.S"), Some(SourceType::Asm));
        assert_eq!(SourceType::of("a/b.cpp"), Some(SourceType::Cpp));
        assert_eq!(SourceType::of("a/b.xpm"), Some(SourceType::Resource));
        assert_eq!(SourceType::of("a/b.o"), None);
        assert_eq!(SourceType::of("a/b.lds"), None);
        assert_eq!(SourceType::of("noext"), None);
    }

    #[test]
    fn collects_only_recognized_sources() {
        let sources = collect_sources(&sample_graph());
        let expected: BTreeSet<PathBuf> = [
            "/os/include/os.h",
            "/os/kernel/clock.c",
            "/os/libcpu/arm/context.S",
        ]
        .iter()
        .map(PathBuf::from)
        .collect();

        assert_eq!(sources, expected);
    }

    #[test]
    fn walk_is_idempotent() {
        let graph = sample_graph();
        let first = collect_sources(&graph);
        let second = collect_sources(&graph);
        assert_eq!(first, second);
    }

    #[test]
    fn shared_nodes_are_visited_once() {
        // os.h hangs off two objects; the walk must still terminate and
        // report it once.
        let sources = collect_sources(&sample_graph());
        assert_eq!(
            sources
                .iter()
                .filter(|p| p.ends_with("os.h"))
                .count(),
            1
        );
    }
}
