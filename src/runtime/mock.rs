use super::{
    BuildRequest, ContainerHandle, ContainerInfo, ContainerRuntime, DaemonConnection,
    DaemonEndpoint, RemoveImageOptions, WaitPolicy,
};
use crate::error::RuntimeError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Runtime operations a [`MockRuntime`] records and can fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    BuildAndStart,
    Inspect,
    Terminate,
    Endpoint,
    Connect,
    RemoveImage,
    Close,
}

#[derive(Debug, Clone)]
enum Fault {
    Fail(String),
    Panic(String),
}

#[derive(Default)]
struct MockState {
    faults: Mutex<HashMap<Step, Fault>>,
    calls: Mutex<Vec<Step>>,
    /// container id -> image id
    containers: Mutex<HashMap<String, String>>,
    images: Mutex<HashSet<String>>,
    last_wait: Mutex<Option<WaitPolicy>>,
}

impl MockState {
    /// Record `step` and apply any scripted fault
    fn enter(&self, step: Step) -> Result<(), RuntimeError> {
        self.calls.lock().unwrap().push(step);
        let fault = self.faults.lock().unwrap().get(&step).cloned();
        match fault {
            None => Ok(()),
            Some(Fault::Fail(message)) => Err(RuntimeError::Injected(message)),
            Some(Fault::Panic(message)) => panic!("{}", message),
        }
    }
}

/// In-memory runtime that simulates a daemon's containers and images
///
/// Every call is recorded; any step can be scripted to fail or panic.
#[derive(Clone, Default)]
pub struct MockRuntime {
    state: Arc<MockState>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `step` return an error with `message`
    pub fn fail_on(self, step: Step, message: impl Into<String>) -> Self {
        self.state
            .faults
            .lock()
            .unwrap()
            .insert(step, Fault::Fail(message.into()));
        self
    }

    /// Make `step` panic with `message`
    pub fn panic_on(self, step: Step, message: impl Into<String>) -> Self {
        self.state
            .faults
            .lock()
            .unwrap()
            .insert(step, Fault::Panic(message.into()));
        self
    }

    pub fn calls(&self) -> Vec<Step> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, step: Step) -> bool {
        self.state.calls.lock().unwrap().contains(&step)
    }

    pub fn container_exists(&self, id: &str) -> bool {
        self.state.containers.lock().unwrap().contains_key(id)
    }

    pub fn image_exists(&self, id: &str) -> bool {
        self.state.images.lock().unwrap().contains(id)
    }

    pub fn container_count(&self) -> usize {
        self.state.containers.lock().unwrap().len()
    }

    /// Wait policy passed to the most recent build
    pub fn last_wait(&self) -> Option<WaitPolicy> {
        *self.state.last_wait.lock().unwrap()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    async fn build_and_start(
        &self,
        request: &BuildRequest,
        wait: WaitPolicy,
    ) -> Result<ContainerHandle, RuntimeError> {
        *self.state.last_wait.lock().unwrap() = Some(wait);
        self.state.enter(Step::BuildAndStart)?;

        let container_id = Uuid::new_v4().simple().to_string();
        let image_id = image_id_for(request);
        self.state.images.lock().unwrap().insert(image_id.clone());
        self.state
            .containers
            .lock()
            .unwrap()
            .insert(container_id.clone(), image_id);

        Ok(ContainerHandle::new(container_id))
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<ContainerInfo, RuntimeError> {
        self.state.enter(Step::Inspect)?;

        let image_id = self
            .state
            .containers
            .lock()
            .unwrap()
            .get(handle.id())
            .cloned()
            .ok_or_else(|| {
                RuntimeError::Injected(format!("No such container: {}", handle.id()))
            })?;

        Ok(ContainerInfo {
            id: handle.id().to_string(),
            image_id,
            name: format!("mock-{}", &handle.id()[..8.min(handle.id().len())]),
        })
    }

    async fn terminate(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.state.enter(Step::Terminate)?;

        match self.state.containers.lock().unwrap().remove(handle.id()) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::Injected(format!(
                "No such container: {}",
                handle.id()
            ))),
        }
    }

    fn daemon_endpoint(&self) -> Result<DaemonEndpoint, RuntimeError> {
        self.state.enter(Step::Endpoint)?;
        Ok(DaemonEndpoint::Unix(PathBuf::from("/mock/docker.sock")))
    }

    async fn connect(
        &self,
        _endpoint: &DaemonEndpoint,
    ) -> Result<Box<dyn DaemonConnection>, RuntimeError> {
        self.state.enter(Step::Connect)?;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

/// Content-addressed image ID: identical build inputs give the same image,
/// as the daemon's build cache does
fn image_id_for(request: &BuildRequest) -> String {
    let mut labels: Vec<_> = request.labels.iter().collect();
    labels.sort();
    let key = format!(
        "{}\0{}\0{:?}",
        request.context_dir.display(),
        request.dockerfile,
        labels
    );
    format!(
        "sha256:{}",
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).simple()
    )
}

struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl DaemonConnection for MockConnection {
    async fn remove_image(
        &self,
        image_id: &str,
        options: RemoveImageOptions,
    ) -> Result<(), RuntimeError> {
        self.state.enter(Step::RemoveImage)?;

        let in_use = self
            .state
            .containers
            .lock()
            .unwrap()
            .values()
            .any(|image| image == image_id);
        if in_use && !options.force {
            return Err(RuntimeError::Injected(format!(
                "conflict: image {} is being used by a container",
                image_id
            )));
        }

        if self.state.images.lock().unwrap().remove(image_id) {
            Ok(())
        } else {
            Err(RuntimeError::Injected(format!("No such image: {}", image_id)))
        }
    }

    async fn close(self: Box<Self>) -> Result<(), RuntimeError> {
        self.state.enter(Step::Close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn request() -> BuildRequest {
        BuildRequest {
            context_dir: PathBuf::from("/ctx"),
            dockerfile: "Dockerfile".to_string(),
            tag: "fixturebox-test:latest".to_string(),
            labels: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_tracks_containers_and_images() {
        let runtime = MockRuntime::new();
        let handle = runtime
            .build_and_start(&request(), WaitPolicy::Exit)
            .await
            .unwrap();
        let info = runtime.inspect(&handle).await.unwrap();

        assert!(runtime.container_exists(&info.id));
        assert!(runtime.image_exists(&info.image_id));
        assert_eq!(runtime.last_wait(), Some(WaitPolicy::Exit));

        runtime.terminate(&handle).await.unwrap();
        assert!(!runtime.container_exists(&info.id));
        assert!(runtime.terminate(&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_image_ids_follow_build_inputs() {
        let runtime = MockRuntime::new();
        let first = runtime
            .build_and_start(&request(), WaitPolicy::Exit)
            .await
            .unwrap();
        let second = runtime
            .build_and_start(&request(), WaitPolicy::Exit)
            .await
            .unwrap();

        let mut relabelled = request();
        relabelled
            .labels
            .insert("fixturebox.id".to_string(), "other".to_string());
        let third = runtime
            .build_and_start(&relabelled, WaitPolicy::Exit)
            .await
            .unwrap();

        let first = runtime.inspect(&first).await.unwrap();
        let second = runtime.inspect(&second).await.unwrap();
        let third = runtime.inspect(&third).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.image_id, second.image_id);
        assert_ne!(first.image_id, third.image_id);
    }

    #[tokio::test]
    async fn test_mock_remove_missing_image_fails() {
        let runtime = MockRuntime::new();
        let endpoint = runtime.daemon_endpoint().unwrap();
        let conn = runtime.connect(&endpoint).await.unwrap();

        let err = conn
            .remove_image("sha256:missing", RemoveImageOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No such image"));
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_fault_is_recorded() {
        let runtime = MockRuntime::new().fail_on(Step::BuildAndStart, "build broke");

        let err = runtime
            .build_and_start(&request(), WaitPolicy::Running)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "build broke");
        assert_eq!(runtime.calls(), vec![Step::BuildAndStart]);
        assert_eq!(runtime.container_count(), 0);
    }
}
