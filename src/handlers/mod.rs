// src/handlers/mod.rs
pub mod topics;
pub mod workflows;
