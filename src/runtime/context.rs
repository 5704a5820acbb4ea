//! Build context handling: turning a Dockerfile path into a [`BuildRequest`]
//! and packaging the context directory for the daemon.

use super::{BuildRequest, FIXTURE_ID_LABEL, MANAGED_LABEL};
use crate::error::{FixtureError, RuntimeError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

impl BuildRequest {
    /// Split `path` into build context and Dockerfile name
    ///
    /// A file path uses its parent directory as the context. A directory path
    /// is the context itself, with `Dockerfile` as the recipe. The image gets a
    /// unique tag under `image_prefix` and a matching `fixturebox.id` label, so
    /// two fixtures built from the same context never share an image ID.
    pub fn from_path(path: &Path, image_prefix: &str) -> Result<Self, FixtureError> {
        let invalid = |reason: &str| FixtureError::InvalidPath {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let (context_dir, dockerfile) = if path.is_dir() {
            if !path.join(DEFAULT_DOCKERFILE).is_file() {
                return Err(invalid("directory does not contain a Dockerfile"));
            }
            (path.to_path_buf(), DEFAULT_DOCKERFILE.to_string())
        } else if path.is_file() {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| invalid("file name is not valid UTF-8"))?;
            let parent = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (parent, name.to_string())
        } else {
            return Err(invalid("no such file or directory"));
        };

        let fixture_id = Uuid::new_v4().to_string();
        let labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (FIXTURE_ID_LABEL.to_string(), fixture_id.clone()),
        ]);

        Ok(Self {
            context_dir,
            dockerfile,
            tag: format!("{}-{}:latest", image_prefix, fixture_id),
            labels,
        })
    }
}

/// Pack the context directory into an uncompressed tar archive
pub fn pack_context(context_dir: &Path) -> Result<Vec<u8>, RuntimeError> {
    let to_err = |source| RuntimeError::Context {
        path: context_dir.to_path_buf(),
        source,
    };

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", context_dir).map_err(to_err)?;
    builder.into_inner().map_err(to_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context_with_dockerfile(name: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(name),
            "FROM busybox:latest\nCMD [\"echo\", \"hello\"]",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_from_file_path_splits_context() {
        let dir = context_with_dockerfile("Dockerfile.test");
        let path = dir.path().join("Dockerfile.test");

        let request = BuildRequest::from_path(&path, "fixturebox").unwrap();

        assert_eq!(request.context_dir, dir.path());
        assert_eq!(request.dockerfile, "Dockerfile.test");
        assert!(request.tag.starts_with("fixturebox-"));
        assert!(request.tag.ends_with(":latest"));
        assert_eq!(
            request.labels.get(MANAGED_LABEL).map(String::as_str),
            Some("true")
        );
    }

    #[test]
    fn test_from_directory_uses_default_dockerfile() {
        let dir = context_with_dockerfile(DEFAULT_DOCKERFILE);

        let request = BuildRequest::from_path(dir.path(), "fixturebox").unwrap();

        assert_eq!(request.context_dir, dir.path());
        assert_eq!(request.dockerfile, DEFAULT_DOCKERFILE);
    }

    #[test]
    fn test_directory_without_dockerfile_rejected() {
        let dir = TempDir::new().unwrap();
        let err = BuildRequest::from_path(dir.path(), "fixturebox").unwrap_err();
        assert!(matches!(err, FixtureError::InvalidPath { .. }));
    }

    #[test]
    fn test_missing_path_rejected() {
        let dir = TempDir::new().unwrap();
        let err =
            BuildRequest::from_path(&dir.path().join("nope/Dockerfile"), "fixturebox").unwrap_err();
        assert!(err.to_string().contains("no such file or directory"));
    }

    #[test]
    fn test_same_context_gets_distinct_tags_and_labels() {
        let dir = context_with_dockerfile(DEFAULT_DOCKERFILE);
        let a = BuildRequest::from_path(dir.path(), "fixturebox").unwrap();
        let b = BuildRequest::from_path(dir.path(), "fixturebox").unwrap();

        assert_eq!(a.context_dir, b.context_dir);
        assert_eq!(a.dockerfile, b.dockerfile);
        assert_ne!(a.tag, b.tag);
        // labels feed the image config, so differing labels mean differing image IDs
        assert_ne!(a.labels, b.labels);
        assert_ne!(a.labels.get(FIXTURE_ID_LABEL), b.labels.get(FIXTURE_ID_LABEL));
    }

    #[test]
    fn test_fixture_id_label_matches_tag() {
        let dir = context_with_dockerfile(DEFAULT_DOCKERFILE);
        let request = BuildRequest::from_path(dir.path(), "fixturebox").unwrap();

        let id = request.labels.get(FIXTURE_ID_LABEL).unwrap();
        assert_eq!(request.tag, format!("fixturebox-{}:latest", id));
    }

    #[test]
    fn test_pack_context_contains_files() {
        let dir = context_with_dockerfile(DEFAULT_DOCKERFILE);
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/input.txt"), "payload").unwrap();

        let archive = pack_context(dir.path()).unwrap();

        let mut entries: Vec<String> = tar::Archive::new(archive.as_slice())
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                e.path()
                    .unwrap()
                    .to_string_lossy()
                    .trim_start_matches("./")
                    .to_string()
            })
            .collect();
        entries.sort();

        assert!(entries.contains(&"Dockerfile".to_string()));
        assert!(entries.contains(&"data/input.txt".to_string()));
    }

    #[test]
    fn test_pack_missing_context_fails() {
        let dir = TempDir::new().unwrap();
        let err = pack_context(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, RuntimeError::Context { .. }));
    }
}
