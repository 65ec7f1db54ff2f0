pub mod audit;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod registry;
pub mod service;

pub use config::CryptoConfig;
pub use error::{CryptoError, ErrorKind, Result};
pub use service::CryptoService;
