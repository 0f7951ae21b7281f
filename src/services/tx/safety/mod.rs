pub mod safety_service;

pub use safety_service::SafetyPolicy;
