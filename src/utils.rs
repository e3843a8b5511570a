//! Path utilities shared by the registry and the packager.

use std::path::{Component, Path, PathBuf};

pub trait PathExt: AsRef<Path> {
    /// Make this path absolute relative to `relative_dir` if not already.
    ///
    /// Note: Does not check if the path exists and no normalization takes place.
    fn abspath_relative_to(&self, relative_dir: impl AsRef<Path>) -> PathBuf {
        if self.as_ref().is_absolute() {
            return self.as_ref().to_owned();
        }

        relative_dir.as_ref().join(self)
    }
}

impl PathExt for Path {}
impl PathExt for PathBuf {}

/// Lower-cased, `/`-separated rendition of `path` used for prefix checks.
///
/// Exclusion rules have to match regardless of how the caller spelled the
/// path (drive letter case, `\` vs `/`, stray `.` components).
pub fn normalize_for_match(path: impl AsRef<Path>) -> String {
    let mut out = String::new();

    for component in path.as_ref().components() {
        match component {
            Component::Prefix(prefix) => {
                out.push_str(&prefix.as_os_str().to_string_lossy().to_lowercase())
            }
            Component::RootDir => out.push('/'),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str("..");
            }
            Component::Normal(name) => {
                if !out.is_empty() && !out.ends_with('/') {
                    out.push('/');
                }
                out.push_str(&name.to_string_lossy().to_lowercase());
            }
        }
    }

    out
}

/// Whether `path` equals `prefix` or lies somewhere beneath it.
///
/// Comparison is case- and separator-insensitive; `under/score` never matches
/// the prefix `under/sco`.
pub fn path_under(path: impl AsRef<Path>, prefix: impl AsRef<Path>) -> bool {
    let path = normalize_for_match(path);
    let prefix = normalize_for_match(prefix);

    if prefix.is_empty() {
        return false;
    }

    match path.strip_prefix(&prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization() {
        assert_eq!(
            normalize_for_match(Path::new("/Foo/./BAR/baz.c")),
            "/foo/bar/baz.c"
        );
        assert_eq!(normalize_for_match(Path::new("a/b")), "a/b");
    }

    #[test]
    fn prefix_matching() {
        assert!(path_under("/os/libcpu/arm/foo.c", "/os/libcpu"));
        assert!(path_under("/os/LibCpu", "/os/libcpu"));
        assert!(!path_under("/os/libcpu2/foo.c", "/os/libcpu"));
        assert!(!path_under("/os/kernel/bar.c", "/os/libcpu"));
    }

    #[test]
    fn abspath_relative() {
        assert_eq!(
            Path::new("inc").abspath_relative_to("/proj/drivers"),
            PathBuf::from("/proj/drivers/inc")
        );
        assert_eq!(
            Path::new("/abs/inc").abspath_relative_to("/proj/drivers"),
            PathBuf::from("/abs/inc")
        );
    }
}
