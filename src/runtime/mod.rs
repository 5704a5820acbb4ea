//! Runtime client seam
//!
//! [`ContainerRuntime`] is everything a fixture needs from a container engine:
//! build and start, inspect, terminate, and opening a fresh daemon connection
//! for image removal. [`DockerRuntime`] talks to a real daemon; [`MockRuntime`]
//! scripts results for tests.

use crate::error::RuntimeError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub mod context;
pub mod docker;
pub mod endpoint;
pub mod mock;

pub use docker::DockerRuntime;
pub use endpoint::DaemonEndpoint;
pub use mock::{MockRuntime, Step};

/// Label attached to every image and container a fixture creates
pub const MANAGED_LABEL: &str = "fixturebox.managed";

/// Label carrying the per-fixture id; makes every build's image config unique
pub const FIXTURE_ID_LABEL: &str = "fixturebox.id";

/// What to wait for after the container has been started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPolicy {
    /// Block until the container process exits (one-shot containers)
    #[default]
    Exit,
    /// Return as soon as the container is running
    Running,
}

impl FromStr for WaitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exit" => Ok(WaitPolicy::Exit),
            "running" => Ok(WaitPolicy::Running),
            other => Err(format!(
                "unknown wait policy '{}', expected exit or running",
                other
            )),
        }
    }
}

impl fmt::Display for WaitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPolicy::Exit => write!(f, "exit"),
            WaitPolicy::Running => write!(f, "running"),
        }
    }
}

/// Image build request derived from a Dockerfile path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Directory sent to the daemon as build context
    pub context_dir: PathBuf,
    /// Dockerfile name, relative to `context_dir`
    pub dockerfile: String,
    /// `repository:tag` applied to the built image
    pub tag: String,
    pub labels: HashMap<String, String>,
}

/// Opaque handle to a started container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Container metadata captured right after start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub image_id: String,
    /// Display name without the leading `/`
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoveImageOptions {
    pub force: bool,
    /// Also delete untagged parent layers
    pub prune_children: bool,
}

impl Default for RemoveImageOptions {
    fn default() -> Self {
        Self {
            force: true,
            prune_children: true,
        }
    }
}

/// Container engine operations used by a fixture
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name for logging
    fn name(&self) -> &str;

    /// Build the image described by `request`, start a container from it and
    /// wait according to `wait`
    ///
    /// On error nothing created by this call is left behind.
    async fn build_and_start(
        &self,
        request: &BuildRequest,
        wait: WaitPolicy,
    ) -> Result<ContainerHandle, RuntimeError>;

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerInfo, RuntimeError>;

    /// Stop and remove the container together with its anonymous volumes
    async fn terminate(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Endpoint of the daemon control socket
    fn daemon_endpoint(&self) -> Result<DaemonEndpoint, RuntimeError>;

    /// Open a new connection to the daemon, negotiating the API version
    async fn connect(
        &self,
        endpoint: &DaemonEndpoint,
    ) -> Result<Box<dyn DaemonConnection>, RuntimeError>;
}

/// Short-lived daemon connection opened for teardown
#[async_trait]
pub trait DaemonConnection: Send + Sync {
    async fn remove_image(
        &self,
        image_id: &str,
        options: RemoveImageOptions,
    ) -> Result<(), RuntimeError>;

    /// Release the connection
    async fn close(self: Box<Self>) -> Result<(), RuntimeError>;
}
