// src/models/mod.rs

pub mod attempt;
pub mod proctor;
pub mod question;
pub mod result;
pub mod violation;
