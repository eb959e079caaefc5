// src/models/mod.rs
pub mod workflow;
