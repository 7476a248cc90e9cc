// src/model/mod.rs

pub mod ad_unit;
pub mod cdb;
pub mod integration;
pub mod mapper;
pub mod slot;
