pub mod error;

pub use error::{AppError, BroadcastRejection};

pub type Result<T> = std::result::Result<T, AppError>;
