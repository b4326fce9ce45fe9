//! Core types used across Tollgate.

mod amount;
mod common;
mod decision;

pub use amount::*;
pub use common::*;
pub use decision::*;
