//! Configuration models and the environment provider.

pub mod env;
pub mod guard;

pub use env::{parse_env_value, parse_mock_sequence, ConfigProvider};
pub use guard::GuardConfig;
