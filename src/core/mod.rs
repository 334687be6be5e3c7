//! Core types, timing constants and the operator input bus

pub mod constants;
pub mod input;
pub mod types;

pub use constants::*;
pub use input::{InputBus, InputReceiver};
pub use types::*;
