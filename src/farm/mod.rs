//! Task-farm module - work distribution between a coordinator and workers.

mod channel;
mod coordinator;
mod message;
mod worker;

pub use channel::*;
pub use coordinator::*;
pub use message::*;
pub use worker::*;
