pub mod request;
#[allow(clippy::module_inception)]
pub mod startup;

pub use request::{PrebuiltAdapter, WorkflowRequest, dispatch};
pub use startup::Application;
