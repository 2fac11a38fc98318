pub mod fetch;
pub mod keys;
#[cfg(feature = "ndjson")]
pub mod ndjson;
pub mod paged;
