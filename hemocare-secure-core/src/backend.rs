//! Device-local [`KeyValueStore`](hemocare_secure_spec::KeyValueStore) implementations.

#[cfg(feature = "file")]
pub mod file;
pub mod memory;

#[cfg(feature = "file")]
pub use file::FileStore;
pub use memory::MemoryStore;
