//! Locked read-modify-write mutations of lots and carriers.

mod engine;
pub mod rules;

#[cfg(test)]
mod engine_props;

pub use engine::MutationEngine;
