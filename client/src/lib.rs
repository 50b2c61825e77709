pub mod cmd;
pub mod session;
pub mod ui;

pub use cmd::*;
pub use session::*;
