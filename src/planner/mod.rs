//! Action planning and dispatch

pub mod dispatcher;

pub use dispatcher::{DispatchContext, Dispatcher};
