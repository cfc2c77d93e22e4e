//! DataBank: an embedded, namespaced key/value store.
//!
//! Each namespace is a `DataVault`: a case-insensitively sorted cache of
//! typed values, optionally persisted to a `.dv` file. Vault files carry a
//! versioned header with a SHA1/SHA256 hash of their payload and are
//! replaced atomically on every persisted write. Repository files (`.dvx`)
//! bundle several segments, possibly nested, each loaded into the vault it
//! names.
//!
//! # Features
//!
//! * Point lookups and glob enumeration (`*`, `?`) over keys
//! * Per-key flags: persist, scramble, read-only, on-demand load, file links
//! * Crash-safe flushes with recovery of interrupted writes at startup
//! * Read-only static vaults served from compiled-in images
//! * Bulk copy or merge of keys between namespaces
//!
//! # Basic Usage
//!
//! ```
//! use databank::{
//!   bank::DataBank,
//!   data::{flags::ItemFlags, value::{DataType, Value}},
//!   option::Options,
//! };
//!
//! let dir = tempfile::tempdir().expect("Failed to create temp dir");
//! let opts = Options {
//!   dir_path: dir.path().to_path_buf(),
//!   ..Default::default()
//! };
//! let bank = DataBank::open(opts).expect("Failed to open databank");
//!
//! // Store a value in the default namespace and flush it to disk
//! bank
//!   .set(None, "level", Value::u32(3), ItemFlags::PERSIST)
//!   .expect("Failed to set");
//!
//! // Read it back
//! let value = bank.get(None, "level", DataType::Auto).expect("Failed to get");
//! assert_eq!(value.as_u32(), Some(3));
//!
//! // Delete it
//! bank.delete(None, "level", ItemFlags::empty()).expect("Failed to delete");
//! ```

mod flush;
mod segment;

pub mod bank;
pub mod compress;
pub mod config;
pub mod crypto;
pub mod data;
pub mod errors;
pub mod fio;
pub mod index;
pub mod iterator;
pub mod option;
pub mod repo;
pub mod util;
pub mod vault;
