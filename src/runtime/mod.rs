//! Async runtime adapters.

pub mod tokio_admission;

pub use tokio_admission::{admit_async, admit_uncancellable};
