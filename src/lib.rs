pub mod access;
pub mod config;
pub mod database;
pub mod error;
pub mod events;
pub mod handlers;
pub mod middleware;
pub mod resource;
pub mod services;

#[cfg(test)]
pub mod testing;

pub use handlers::{router, AppState};
