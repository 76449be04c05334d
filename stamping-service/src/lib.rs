pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod providers;
pub mod services;
pub mod startup;

pub use startup::{AppState, Application};
