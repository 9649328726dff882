//! Builders to construct guards from configuration.

pub mod guard_builder;

pub use guard_builder::GuardBuilder;
