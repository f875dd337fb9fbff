pub mod envelope;
pub mod key;
pub mod key_cache;
