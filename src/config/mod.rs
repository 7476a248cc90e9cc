// src/config/mod.rs

pub mod config_manager;
pub mod settings;
