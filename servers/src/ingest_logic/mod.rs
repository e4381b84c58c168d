pub mod adapters;
pub mod config;
pub mod logger;
pub mod state;
