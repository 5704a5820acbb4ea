//! Disposable container built from a Dockerfile
//!
//! A [`ContainerFixture`] builds an image, runs a container from it and keeps
//! the inspection snapshot. [`ContainerFixture::cleanup`] removes the container
//! and then the image through a fresh daemon connection.
//!
//! # Example
//!
//! ```no_run
//! use fixturebox::ContainerFixture;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fixture = ContainerFixture::new("path/to/Dockerfile").await?;
//! println!("container {} from image {}", fixture.id(), fixture.image_id());
//! fixture.cleanup().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::FixtureConfig;
use crate::error::{CleanupError, FixtureError, RuntimeError};
use crate::runtime::{
    BuildRequest, ContainerHandle, ContainerInfo, ContainerRuntime, DaemonEndpoint,
    DockerRuntime, RemoveImageOptions,
};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ContainerFixture {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
    info: ContainerInfo,
    cleaned_up: bool,
}

impl ContainerFixture {
    /// Build and run `path` against the daemon configured in the environment
    ///
    /// `path` is either a Dockerfile or a directory containing one. Unparsable
    /// `FIXTUREBOX_*` values are reported as [`FixtureError::Config`].
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        Self::with_config(FixtureConfig::from_env()?, path).await
    }

    pub async fn with_config(
        config: FixtureConfig,
        path: impl AsRef<Path>,
    ) -> Result<Self, FixtureError> {
        config.validate()?;
        let endpoint = config.daemon_endpoint()?;
        let runtime = DockerRuntime::new(config.clone())
            .map_err(|source| client_setup_error(&endpoint, source))?;
        Self::start(Arc::new(runtime), &config, path.as_ref()).await
    }

    /// Build and run `path` using an explicit runtime client
    ///
    /// `config` is validated before the runtime is touched.
    pub async fn with_runtime(
        runtime: Arc<dyn ContainerRuntime>,
        config: &FixtureConfig,
        path: impl AsRef<Path>,
    ) -> Result<Self, FixtureError> {
        config.validate()?;
        Self::start(runtime, config, path.as_ref()).await
    }

    async fn start(
        runtime: Arc<dyn ContainerRuntime>,
        config: &FixtureConfig,
        path: &Path,
    ) -> Result<Self, FixtureError> {
        let request = BuildRequest::from_path(path, &config.image_prefix)?;
        debug!(
            "Building {} from {} in {} ({})",
            request.tag,
            request.dockerfile,
            request.context_dir.display(),
            runtime.name()
        );

        let handle = runtime
            .build_and_start(&request, config.wait)
            .await
            .map_err(|source| FixtureError::Start {
                path: path.to_path_buf(),
                source,
            })?;

        let info = match runtime.inspect(&handle).await {
            Ok(info) => info,
            Err(source) => {
                if let Err(e) = runtime.terminate(&handle).await {
                    warn!(
                        "Failed to terminate container {} after inspection error: {}",
                        handle.id(),
                        e
                    );
                }
                return Err(FixtureError::Inspect {
                    id: handle.id().to_string(),
                    source,
                });
            }
        };

        info!(
            "Container fixture {} ready (container {}, image {})",
            info.name, info.id, info.image_id
        );

        Ok(Self {
            runtime,
            handle,
            info,
            cleaned_up: false,
        })
    }

    /// Container ID
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// ID of the image the container was started from
    pub fn image_id(&self) -> &str {
        &self.info.image_id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &ContainerInfo {
        &self.info
    }

    /// Remove the container and its image
    ///
    /// Terminates the container first and only then removes the image over a
    /// new daemon connection. Image removal is skipped if termination fails.
    /// A panic anywhere in the sequence is caught and reported as
    /// [`FixtureError::Panic`] next to any error already collected.
    pub async fn cleanup(mut self) -> Result<(), CleanupError> {
        let mut causes = Vec::new();

        let outcome = AssertUnwindSafe(self.teardown(&mut causes))
            .catch_unwind()
            .await;
        if let Err(payload) = outcome {
            causes.push(FixtureError::Panic(panic_message(payload.as_ref())));
        }
        self.cleaned_up = true;

        if causes.is_empty() {
            info!(
                "Removed container {} and image {}",
                self.info.id, self.info.image_id
            );
            Ok(())
        } else {
            Err(CleanupError::new(causes))
        }
    }

    async fn teardown(&self, causes: &mut Vec<FixtureError>) {
        if let Err(source) = self.runtime.terminate(&self.handle).await {
            causes.push(FixtureError::Terminate {
                id: self.info.id.clone(),
                source,
            });
            return;
        }

        let endpoint = match self.runtime.daemon_endpoint() {
            Ok(endpoint) => endpoint,
            Err(source) => {
                causes.push(FixtureError::Endpoint { source });
                return;
            }
        };

        let connection = match self.runtime.connect(&endpoint).await {
            Ok(connection) => connection,
            Err(source) => {
                causes.push(FixtureError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                });
                return;
            }
        };

        if let Err(source) = connection
            .remove_image(&self.info.image_id, RemoveImageOptions::default())
            .await
        {
            causes.push(FixtureError::RemoveImage {
                name: self.info.name.clone(),
                image_id: self.info.image_id.clone(),
                source,
            });
        }

        if let Err(e) = connection.close().await {
            warn!("Can't close daemon connection to {}: {}", endpoint, e);
        }
    }
}

impl Drop for ContainerFixture {
    fn drop(&mut self) {
        if !self.cleaned_up {
            warn!(
                "Container fixture dropped without cleanup; container {} and image {} are left behind",
                self.info.id, self.info.image_id
            );
        }
    }
}

impl std::fmt::Debug for ContainerFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerFixture")
            .field("runtime", &self.runtime.name())
            .field("info", &self.info)
            .finish()
    }
}

/// Client construction failures are configuration or connection problems,
/// never a failed start
fn client_setup_error(endpoint: &DaemonEndpoint, source: RuntimeError) -> FixtureError {
    match source {
        RuntimeError::Config(e) => FixtureError::Config(e),
        source => FixtureError::Connect {
            endpoint: endpoint.to_string(),
            source,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
