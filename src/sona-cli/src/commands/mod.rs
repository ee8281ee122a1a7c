//! Command handlers for sona CLI

pub mod configure;
pub mod extract;
pub mod mapping;
pub mod metadata;
mod run;
