// src/network/mod.rs

pub mod bid_request_sender;
pub mod live_bid_request_sender;
pub mod pub_sdk_api;
