// src/lib.rs

pub mod chat;
pub mod compaction;
pub mod config;
pub mod db;
pub mod engagement;
pub mod llm;
pub mod roster;
pub mod schedule;
pub mod server;
pub mod settings;
pub mod state;
pub mod tasks;

pub use state::AppState;
