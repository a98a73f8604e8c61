//! Cooperative task primitives: fulfillable futures, deferred execution,
//! observable state machines, single-flight caching, and serial dispatch.

mod cache;
mod cancel;
mod deferred;
mod future;
mod handle;
mod observable;
mod queue;
mod registry;

pub use cache::SingleFlight;
pub use cancel::CancelFlag;
pub use deferred::Deferred;
pub use future::Fulfillable;
pub use handle::{
    ProgressCounter, ProgressUnits, TaskHandle, TaskId, TaskKind, TaskPhase, TaskSnapshot, WaitEdge,
};
pub use observable::{ObservableTask, TaskState};
pub use queue::SerialQueue;
pub use registry::TaskRegistry;
