//! Error types for fixture construction and teardown

use crate::config::ConfigError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a [`ContainerRuntime`](crate::runtime::ContainerRuntime)
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The Docker Engine API returned an error
    #[error("docker api: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// The image build stream reported a failure
    #[error("image build failed: {0}")]
    Build(String),

    /// The build context could not be packaged
    #[error("packaging build context {}: {source}", path.display())]
    Context {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The daemon response lacked a field the fixture relies on
    #[error("daemon response is missing `{0}`")]
    MissingField(&'static str),

    /// A blocking helper task did not complete
    #[error("background task failed: {0}")]
    TaskJoin(String),

    /// Daemon endpoint configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failure scripted by a mock runtime
    #[error("{0}")]
    Injected(String),
}

/// Errors produced by [`ContainerFixture`](crate::ContainerFixture) operations
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("invalid build path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("starting container from {}: {source}", path.display())]
    Start {
        path: PathBuf,
        #[source]
        source: RuntimeError,
    },

    #[error("inspecting container {id}: {source}")]
    Inspect {
        id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("terminating container {id}: {source}")]
    Terminate {
        id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("resolving daemon endpoint: {source}")]
    Endpoint {
        #[source]
        source: RuntimeError,
    },

    #[error("creating docker client for {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: RuntimeError,
    },

    #[error("removing image {name}({image_id}): {source}")]
    RemoveImage {
        name: String,
        image_id: String,
        #[source]
        source: RuntimeError,
    },

    #[error("panic: {0}")]
    Panic(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Every failure collected while tearing a fixture down
///
/// Displays one cause per line, in the order they occurred.
#[derive(Debug)]
pub struct CleanupError {
    causes: Vec<FixtureError>,
}

impl CleanupError {
    pub(crate) fn new(causes: Vec<FixtureError>) -> Self {
        Self { causes }
    }

    pub fn causes(&self) -> &[FixtureError] {
        &self.causes
    }

    /// True if any cause was a panic caught during teardown
    pub fn is_panic(&self) -> bool {
        self.causes
            .iter()
            .any(|cause| matches!(cause, FixtureError::Panic(_)))
    }
}

impl fmt::Display for CleanupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cause) in self.causes.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for CleanupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.causes
            .first()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
