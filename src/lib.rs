pub mod api;
pub mod batch;
pub mod commands;
pub mod config;
pub mod error;
pub mod utils;

pub use batch::{BatchInterpreter, BatchResult, Cancellation};
pub use commands::{CommandRegistry, GlobalModifiers, Handler, Services};
pub use error::CommandError;
