//! Control API - List/control operations and their HTTP surface

mod control;
pub mod http;

pub use control::{ControlApi, ControlFunction, ControlReply, Outcome};
pub use http::{router, serve};
