pub mod builder;
pub mod codec;
pub mod error;
pub mod net;
pub mod time;
pub mod types;

pub use error::*;
pub use types::*;
