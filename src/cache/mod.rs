// src/cache/mod.rs

pub mod sdk_cache;
