pub mod client;
pub mod cmd;

pub use client::*;
pub use cmd::*;
