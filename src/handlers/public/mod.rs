// handlers/public/mod.rs - Public handlers (no installation access required)
//
// Security Level: None
// Route Prefix: none (/, /health)

pub mod health;

pub use health::{health, root};
