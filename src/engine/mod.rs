// src/engine/mod.rs
//
// Synchronous exam core. Nothing in here touches I/O or an async runtime.

pub mod attempt;
pub mod classifier;
pub mod monitor;
pub mod scoring;
pub mod timer;
