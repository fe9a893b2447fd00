//! LED sign handlers.

pub mod bridge;
pub mod command;
pub mod driver;
