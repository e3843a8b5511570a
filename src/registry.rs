//! The build component registry and its merge semantics.
//!
//! Components ("groups") are registered one source subdirectory at a time;
//! registering the same name twice folds the attribute bags together instead
//! of erroring. Attribute lists concatenate in registration order with no
//! deduplication: flag order can matter and toolchains tolerate duplicates.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Attribute bag of a component.
///
/// The `local_*` variants apply only to the component's own sources, which
/// are then compiled outside the shared default environment.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAttrs {
    pub cflags: Vec<String>,
    pub include_paths: Vec<PathBuf>,
    pub defines: Vec<String>,
    pub asflags: Vec<String>,
    pub linkflags: Vec<String>,
    pub libs: Vec<String>,
    pub lib_paths: Vec<PathBuf>,

    pub local_cflags: Vec<String>,
    pub local_include_paths: Vec<PathBuf>,
    pub local_defines: Vec<String>,
    pub local_asflags: Vec<String>,
}

impl BuildAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append compile flags given as one command-line style string.
    #[must_use]
    pub fn with_cflags(mut self, flags: &str) -> Self {
        self.cflags.extend(split_flags(flags));
        self
    }

    #[must_use]
    pub fn with_include_paths(
        mut self,
        paths: impl IntoIterator<Item = impl Into<PathBuf>>,
    ) -> Self {
        self.include_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_defines(mut self, defines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.defines.extend(defines.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_asflags(mut self, flags: &str) -> Self {
        self.asflags.extend(split_flags(flags));
        self
    }

    #[must_use]
    pub fn with_linkflags(mut self, flags: &str) -> Self {
        self.linkflags.extend(split_flags(flags));
        self
    }

    #[must_use]
    pub fn with_libs(mut self, libs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.libs.extend(libs.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_lib_paths(mut self, paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        self.lib_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_local_cflags(mut self, flags: &str) -> Self {
        self.local_cflags.extend(split_flags(flags));
        self
    }

    #[must_use]
    pub fn with_local_include_paths(
        mut self,
        paths: impl IntoIterator<Item = impl Into<PathBuf>>,
    ) -> Self {
        self.local_include_paths
            .extend(paths.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_local_defines(
        mut self,
        defines: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.local_defines
            .extend(defines.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_local_asflags(mut self, flags: &str) -> Self {
        self.local_asflags.extend(split_flags(flags));
        self
    }

    /// Fold `other` into this bag: every list is concatenated in
    /// registration order, duplicates preserved verbatim.
    pub fn merge(&mut self, other: BuildAttrs) {
        self.cflags.extend(other.cflags);
        self.include_paths.extend(other.include_paths);
        self.defines.extend(other.defines);
        self.asflags.extend(other.asflags);
        self.linkflags.extend(other.linkflags);
        self.libs.extend(other.libs);
        self.lib_paths.extend(other.lib_paths);

        self.local_cflags.extend(other.local_cflags);
        self.local_include_paths.extend(other.local_include_paths);
        self.local_defines.extend(other.local_defines);
        self.local_asflags.extend(other.local_asflags);
    }

    /// Accumulate the non-local lists of `other` into the shared default
    /// environment, skipping entries already present.
    pub fn append_unique(&mut self, other: &BuildAttrs) {
        append_unique(&mut self.cflags, &other.cflags);
        append_unique(&mut self.include_paths, &other.include_paths);
        append_unique(&mut self.defines, &other.defines);
        append_unique(&mut self.asflags, &other.asflags);
        append_unique(&mut self.linkflags, &other.linkflags);
        append_unique(&mut self.libs, &other.libs);
        append_unique(&mut self.lib_paths, &other.lib_paths);
    }

    /// Whether any per-file override attribute is set.
    pub fn has_local(&self) -> bool {
        !self.local_cflags.is_empty()
            || !self.local_include_paths.is_empty()
            || !self.local_defines.is_empty()
            || !self.local_asflags.is_empty()
    }
}

fn append_unique<T: Clone + PartialEq>(dst: &mut Vec<T>, src: &[T]) {
    for item in src {
        if !dst.contains(item) {
            dst.push(item.clone());
        }
    }
}

/// Split a command-line style flag string into individual arguments.
pub fn split_flags(flags: &str) -> Vec<String> {
    shlex::split(flags).unwrap_or_default()
}

/// Rewrite the C99 language-standard flag to its GNU dialect variant.
///
/// Newer gcc releases reject some of the firmware sources under plain
/// `-std=c99`; the original applies the same textual patch at registration
/// time.
pub fn patch_gcc_dialect(flags: &mut [String]) {
    for flag in flags {
        if flag == "-std=c99" {
            *flag = "-std=gnu99".to_owned();
        }
    }
}

/// A named, conditionally-included unit of source files and build attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Unique name within the registry at assembly time.
    pub name: String,
    /// Directory of the first registration; used for library-file placement
    /// and file-level exclusion checks.
    pub path: PathBuf,
    /// Absolute source paths, in registration order.
    pub sources: Vec<PathBuf>,
    pub attrs: BuildAttrs,
}

/// Ordered collection of components, name-keyed on insert.
///
/// Insertion order is retained while the registry grows; consumers get a
/// name-sorted view so multi-run output stays deterministic.
#[derive(Debug, Default)]
pub struct Registry {
    components: Vec<Component>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `component`, folding it into an existing entry with the same
    /// name. The first registration's canonical path wins.
    pub fn insert(&mut self, component: Component) {
        match self
            .components
            .iter_mut()
            .find(|c| c.name == component.name)
        {
            Some(existing) => {
                existing.sources.extend(component.sources);
                existing.attrs.merge(component.attrs);
            }
            None => self.components.push(component),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Canonical path of a component, if registered.
    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.get(name).map(|c| c.path.as_path())
    }

    /// Components in registration order.
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Name-sorted view for assembly and backend dispatch.
    pub fn sorted(&self) -> Vec<&Component> {
        let mut sorted: Vec<&Component> = self.components.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
