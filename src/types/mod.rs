#![allow(dead_code)]

mod error;
mod event;
mod query;
mod stack;
mod tenant;
mod usage;

pub use error::*;
pub use event::*;
pub use query::*;
pub use stack::*;
pub use tenant::*;
pub use usage::*;
