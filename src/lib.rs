//! fixturebox - disposable Dockerfile-built containers for integration tests
//!
//! A [`ContainerFixture`] builds an image from a Dockerfile, runs a container
//! from it (by default waiting for the process to exit) and records the
//! container and image IDs. [`ContainerFixture::cleanup`] terminates the
//! container and removes the image, collecting every failure, panics
//! included, into one [`CleanupError`].
//!
//! # Example Usage
//!
//! ```no_run
//! use fixturebox::ContainerFixture;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fixture = ContainerFixture::new("tests/data/Dockerfile").await?;
//! assert_ne!(fixture.id(), fixture.image_id());
//! fixture.cleanup().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`fixture`]: the fixture lifecycle
//! - [`runtime`]: container engine seam, Docker client and mock runtime
//! - [`config`]: environment-driven configuration
//! - [`error`]: error types
//! - [`util`]: logging setup

pub mod config;
pub mod error;
pub mod fixture;
pub mod runtime;
pub mod util;

pub use config::{ConfigError, FixtureConfig};
pub use error::{CleanupError, FixtureError, RuntimeError};
pub use fixture::ContainerFixture;
pub use runtime::{
    ContainerInfo, ContainerRuntime, DaemonConnection, DaemonEndpoint, DockerRuntime,
    MockRuntime, WaitPolicy,
};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
