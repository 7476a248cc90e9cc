// src/bidding/mod.rs

pub mod bid_manager;
pub mod executor;
pub mod listener;
