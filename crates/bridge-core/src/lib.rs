pub mod config;
pub mod error;
pub mod mapping;
pub mod ports;
pub mod transform;
pub mod types;

pub use error::BridgeError;
pub use mapping::MappingRegistry;
pub use transform::Transformer;
