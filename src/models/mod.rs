//! Domain models for Mirror Operator

mod account;
mod event;
mod trade;

pub use account::*;
pub use event::*;
pub use trade::*;
