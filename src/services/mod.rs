// src/services/mod.rs

pub mod exam_service;
pub mod postgres;
pub mod store;
pub mod sweeper;
