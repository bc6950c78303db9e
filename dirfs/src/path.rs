//! Splitting absolute paths into directory entry names.

use std::path::{Component, Path};

use crate::dir::validate_name;
use crate::error::{FsError, Result};

/// Returns the names along `path`, root first. `/` yields no names.
pub fn components(path: &Path) -> Result<Vec<String>> {
    let mut parts = path.components();
    if Some(Component::RootDir) != parts.next() {
        return Err(FsError::InvalidPath(
            "path must start with \"/\"".to_string(),
        ));
    }

    parts
        .map(|part| match part {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| {
                    FsError::InvalidPath(format!("{:?} is not valid UTF-8", name))
                })?;
                validate_name(name)?;
                Ok(name.to_string())
            }
            other => Err(FsError::InvalidPath(format!(
                "unsupported component {:?}",
                other.as_os_str()
            ))),
        })
        .collect()
}

/// Splits `path` into its parent names and the final name.
pub fn split_target(path: &Path) -> Result<(Vec<String>, String)> {
    let mut parts = components(path)?;
    let target = parts
        .pop()
        .ok_or_else(|| FsError::InvalidPath("path names the root directory".to_string()))?;
    Ok((parts, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn root_has_no_components() {
        assert!(components(Path::new("/")).unwrap().is_empty());
    }

    #[test]
    fn splits_nested_paths() {
        let (parents, target) = split_target(Path::new("/a/b//c/")).unwrap();
        assert_eq!(parents, vec!["a", "b"]);
        assert_eq!(target, "c");
    }

    #[test]
    fn sequence_paths_are_collected_into_path_bufs() {
        let path: PathBuf = ["/", "usr", "bin"].iter().collect();
        assert_eq!(components(&path).unwrap(), vec!["usr", "bin"]);
    }

    #[test]
    fn relative_paths_are_rejected() {
        assert!(matches!(
            components(Path::new("a/b")),
            Err(FsError::InvalidPath(_))
        ));
    }

    #[test]
    fn parent_components_are_rejected() {
        assert!(matches!(
            components(Path::new("/a/../b")),
            Err(FsError::InvalidPath(_))
        ));
    }

    #[test]
    fn long_components_are_rejected() {
        assert!(matches!(
            components(Path::new("/averylongname")),
            Err(FsError::NameTooLong(_))
        ));
    }

    #[test]
    fn root_cannot_be_a_target() {
        assert!(matches!(
            split_target(Path::new("/")),
            Err(FsError::InvalidPath(_))
        ));
    }
}
