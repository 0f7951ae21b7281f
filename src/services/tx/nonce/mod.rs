pub mod nonce_service;

pub use nonce_service::{AccountNonceState, NonceLease, NonceManager};
