//! Isolated command execution
//!
//! Every toolchain command runs in an ephemeral container built from a
//! declarative [`BuildRecipe`]. The [`Executor`] owns the runtime, applies the
//! command timeout and turns raw output into typed values.

pub mod command;
pub mod docker;
pub mod executor;
pub mod recipe;
pub mod runtime;

pub use command::{json_transform, AccessMode, ContainerCommand, Mount, Transform};
pub use docker::DockerRuntime;
pub use executor::Executor;
pub use recipe::{BuildRecipe, SetupStep};
pub use runtime::{ContainerRuntime, RunOutput, RunRequest};
