#![doc = include_str!("../README.md")]

mod balancer;
mod config;
mod dispatcher;
mod error;
mod heap;
mod pool;
mod request;
mod task;
mod worker;

pub use crate::balancer::*;
pub use crate::config::*;
pub use crate::dispatcher::*;
pub use crate::error::*;
pub use crate::heap::*;
pub use crate::pool::*;
pub use crate::request::*;
pub use crate::task::*;
pub use crate::worker::*;
