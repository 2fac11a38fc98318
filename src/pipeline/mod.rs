pub mod adapters;
pub mod bounded;
pub mod cancel;
pub mod chain;
pub mod config;
pub mod fallback;
pub mod progress;
pub mod retry;
pub mod stage;
