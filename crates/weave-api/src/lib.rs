//! StyleWeave API Library
//!
//! HTTP handlers, application state and setup, and the HD render task
//! handler run by the worker pool.

mod api_doc;
mod handlers;
mod task_handlers;

pub mod error;
pub mod setup;
pub mod state;
pub mod workdir;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
pub use task_handlers::{HdRenderTaskHandler, TaskHandler};
pub use weave_worker::{TaskQueue, TaskQueueConfig};
