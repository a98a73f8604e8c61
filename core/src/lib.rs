//! Atelier core: task orchestration and build-dependency scheduling for
//! on-device diffusion models.
//!
//! The crate is organized around a small set of task primitives (see
//! [`task`]) composed into a dependency-driven build engine that downloads,
//! reassembles, and extracts model archives, and a [`kernel::Kernel`] facade
//! that application shells drive.

pub mod assets;
pub mod build;
pub mod config;
pub mod context;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod task;

pub use context::AppContext;
pub use kernel::Kernel;
