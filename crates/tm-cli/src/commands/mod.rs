//! Command implementations

pub mod common;
pub mod ls;
pub mod plan;
pub mod run;
pub mod validate;
