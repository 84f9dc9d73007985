pub mod config;
pub mod consumers;
pub mod database;
pub mod entity;
pub mod error;
pub mod permissions;
pub mod reaper;
pub mod services;
pub mod state;
pub mod utils;
