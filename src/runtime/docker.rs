use super::context::pack_context;
use super::{
    BuildRequest, ContainerHandle, ContainerInfo, ContainerRuntime, DaemonConnection,
    DaemonEndpoint, RemoveImageOptions, WaitPolicy,
};
use crate::config::FixtureConfig;
use crate::error::RuntimeError;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::Bytes;
use futures_util::stream::StreamExt;
use tracing::{debug, info, warn};

/// Runtime client backed by the Docker Engine API
///
/// Works with any daemon speaking that API (Docker, Podman's compat socket).
pub struct DockerRuntime {
    docker: Docker,
    config: FixtureConfig,
}

impl DockerRuntime {
    /// Connect to the daemon selected by `config`
    ///
    /// Only the endpoint is checked here; callers validate the rest.
    pub fn new(config: FixtureConfig) -> Result<Self, RuntimeError> {
        let endpoint = config.daemon_endpoint()?;
        debug!("Connecting to container daemon at {}", endpoint);
        let docker = open(&endpoint, config.connect_timeout_secs)?;
        Ok(Self { docker, config })
    }

    async fn build_image(&self, request: &BuildRequest, archive: Vec<u8>) -> Result<(), RuntimeError> {
        let options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: request.tag.clone(),
            labels: request.labels.clone(),
            rm: true,
            forcerm: true,
            ..Default::default()
        };

        let mut stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(archive)));

        while let Some(item) = stream.next().await {
            let info = item?;
            if let Some(error) = info.error {
                return Err(RuntimeError::Build(error));
            }
            if let Some(line) = info.stream.as_deref().map(str::trim) {
                if !line.is_empty() {
                    debug!("build {}: {}", request.tag, line);
                }
            }
            if let Some(id) = info.aux.and_then(|aux| aux.id) {
                debug!("Built image {} ({})", request.tag, id);
            }
        }

        Ok(())
    }

    async fn run_container(
        &self,
        request: &BuildRequest,
        wait: WaitPolicy,
    ) -> Result<ContainerHandle, RuntimeError> {
        let name = container_name(&request.tag);
        let config = Config {
            image: Some(request.tag.clone()),
            labels: Some(request.labels.clone()),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.clone(),
                    platform: None,
                }),
                config,
            )
            .await?;
        for warning in &created.warnings {
            warn!("Container {}: {}", name, warning);
        }
        let handle = ContainerHandle::new(created.id);

        if let Err(e) = self.start_and_wait(&handle, wait).await {
            self.remove_container_quietly(&handle).await;
            return Err(e);
        }

        Ok(handle)
    }

    async fn start_and_wait(
        &self,
        handle: &ContainerHandle,
        wait: WaitPolicy,
    ) -> Result<(), RuntimeError> {
        self.docker
            .start_container(handle.id(), None::<StartContainerOptions<String>>)
            .await?;
        debug!("Started container {}", handle.id());

        if wait == WaitPolicy::Running {
            return Ok(());
        }

        let mut stream = self.docker.wait_container(
            handle.id(),
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );
        while let Some(result) = stream.next().await {
            match result {
                Ok(response) => {
                    debug!(
                        "Container {} exited with status {}",
                        handle.id(),
                        response.status_code
                    );
                }
                // a non-zero exit still means the process has finished
                Err(bollard::errors::Error::DockerContainerWaitError { code, error }) => {
                    debug!(
                        "Container {} exited with status {} {}",
                        handle.id(),
                        code,
                        error
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    async fn remove_container_quietly(&self, handle: &ContainerHandle) {
        if let Err(e) = self.terminate(handle).await {
            warn!("Failed to remove container {}: {}", handle.id(), e);
        }
    }

    async fn remove_image_quietly(&self, image: &str) {
        let options = bollard::image::RemoveImageOptions {
            force: true,
            noprune: false,
        };
        if let Err(e) = self.docker.remove_image(image, Some(options), None).await {
            warn!("Failed to remove image {}: {}", image, e);
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn build_and_start(
        &self,
        request: &BuildRequest,
        wait: WaitPolicy,
    ) -> Result<ContainerHandle, RuntimeError> {
        let context_dir = request.context_dir.clone();
        let archive = tokio::task::spawn_blocking(move || pack_context(&context_dir))
            .await
            .map_err(|e| RuntimeError::TaskJoin(e.to_string()))??;
        debug!(
            "Packed build context {} ({} bytes)",
            request.context_dir.display(),
            archive.len()
        );

        self.build_image(request, archive).await?;

        match self.run_container(request, wait).await {
            Ok(handle) => {
                info!("Container {} started from {}", handle.id(), request.tag);
                Ok(handle)
            }
            Err(e) => {
                self.remove_image_quietly(&request.tag).await;
                Err(e)
            }
        }
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerInfo, RuntimeError> {
        let response = self
            .docker
            .inspect_container(handle.id(), None::<InspectContainerOptions>)
            .await?;

        let id = response.id.ok_or(RuntimeError::MissingField("Id"))?;
        let image_id = response.image.ok_or(RuntimeError::MissingField("Image"))?;
        let name = response
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_default();

        Ok(ContainerInfo { id, image_id, name })
    }

    async fn terminate(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                handle.id(),
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;
        debug!("Removed container {}", handle.id());
        Ok(())
    }

    fn daemon_endpoint(&self) -> Result<DaemonEndpoint, RuntimeError> {
        Ok(self.config.daemon_endpoint()?)
    }

    async fn connect(
        &self,
        endpoint: &DaemonEndpoint,
    ) -> Result<Box<dyn DaemonConnection>, RuntimeError> {
        let docker = open(endpoint, self.config.connect_timeout_secs)?
            .negotiate_version()
            .await?;
        debug!("Opened daemon connection to {}", endpoint);
        Ok(Box::new(DockerConnection { docker }))
    }
}

struct DockerConnection {
    docker: Docker,
}

#[async_trait]
impl DaemonConnection for DockerConnection {
    async fn remove_image(
        &self,
        image_id: &str,
        options: RemoveImageOptions,
    ) -> Result<(), RuntimeError> {
        let removed = self
            .docker
            .remove_image(
                image_id,
                Some(bollard::image::RemoveImageOptions {
                    force: options.force,
                    noprune: !options.prune_children,
                }),
                None,
            )
            .await?;
        debug!("Removed image {} ({} entries)", image_id, removed.len());
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), RuntimeError> {
        drop(self);
        Ok(())
    }
}

fn open(endpoint: &DaemonEndpoint, timeout_secs: u64) -> Result<Docker, RuntimeError> {
    let docker = match endpoint {
        DaemonEndpoint::Unix(path) => {
            Docker::connect_with_socket(&path.to_string_lossy(), timeout_secs, API_DEFAULT_VERSION)?
        }
        DaemonEndpoint::Tcp(_) => Docker::connect_with_http(
            &endpoint.to_client_addr(),
            timeout_secs,
            API_DEFAULT_VERSION,
        )?,
    };
    Ok(docker)
}

/// Container name derived from the image tag, e.g. `fixturebox-<uuid>`
fn container_name(tag: &str) -> String {
    tag.split(':').next().unwrap_or(tag).replace('/', "_")
}
