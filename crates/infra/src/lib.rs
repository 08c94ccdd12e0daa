//! Infrastructure collaborators for the Grantwell engine
//!
//! Implements the ports the core engine depends on:
//! - **[`cache`]**: token caches: platform keyring (secure store) and an
//!   in-memory variant for tests and hosts without a keyring
//! - **[`discovery_store`]**: file-backed persistence for discovery
//!   documents
//! - **[`loopback`]**: the local HTTP listener that receives the
//!   authorization redirect callback

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod cache;
pub mod discovery_store;
pub mod loopback;

// Re-export commonly used types
pub use cache::{KeyringTokenCache, MemoryTokenCache};
pub use discovery_store::FileDiscoveryStore;
pub use loopback::LoopbackListener;
