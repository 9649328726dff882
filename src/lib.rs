//! # AGit Guard
//!
//! Guards protecting a shared, multi-tenant repository host from overload and
//! from writes into administratively locked repositories.
//!
//! ## Components
//!
//! - **Load admission**: samples the one-minute load average as a percentage
//!   of CPU capacity. Below the soft limit a write proceeds; between soft and
//!   hard limit the caller backs off for a random interval and retries; at the
//!   hard limit, or once the retry budget is spent, the write is refused.
//! - **Write-lock gate**: refuses a ref transaction when an `agit-repo.lock`
//!   file exists in the repository's control directory or any ancestor.
//! - **Timestamp touch**: bumps `<control-dir>/info/last-modified` after a
//!   committed write.
//!
//! Progress and error lines go to the client over a side-band channel when
//! one is engaged, otherwise to stderr.
//!
//! ## Configuration
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `AGIT_LOADAVG_SOFT_LIMIT` | soft threshold, percent | 150 |
//! | `AGIT_LOADAVG_HARD_LIMIT` | hard threshold, percent | 300 |
//! | `AGIT_LOADAVG_SLEEP_MIN` | min backoff seconds | 10 |
//! | `AGIT_LOADAVG_SLEEP_MAX` | max backoff seconds | 60 |
//! | `AGIT_LOADAVG_RETRY` | backoff rounds | 3 |
//! | `AGIT_TEST_LOADAVG_DRY_RUN` | report sleeps without sleeping | off |
//! | `AGIT_TEST_LOADAVG_MOCK` | comma-separated load percentages | unset |
//! | `GIT_REFS_TXN_NO_HOOK` | skip the write-lock check | off |
//!
//! ## Example
//!
//! ```rust,no_run
//! use agit_guard::builders::GuardBuilder;
//! use agit_guard::core::RefTransaction;
//!
//! let guard = GuardBuilder::from_env().build();
//!
//! let txn = RefTransaction::new("/srv/git/project.git", 2);
//! if let Some(reason) = guard.check_write_lock(&txn).reason() {
//!     eprintln!("{reason}");
//!     return;
//! }
//! if guard.admit(true).is_rejected() {
//!     return;
//! }
//! // ... apply the transaction ...
//! guard.touch_timestamp(std::path::Path::new("/srv/git/project.git"));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Guard algorithms and their shared types.
pub mod core;
/// Configuration models and the environment provider.
pub mod config;
/// Builders to construct guards from configuration.
pub mod builders;
/// Infrastructure adapters for load sources and report channels.
pub mod infra;
/// Async runtime adapters.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
