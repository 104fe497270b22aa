//! Command handlers

pub mod config;
pub mod data;
pub mod status;
