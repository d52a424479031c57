// src/handlers/mod.rs

pub mod assignments;
pub mod attempts;
pub mod auth;
pub mod exams;
pub mod health;
pub mod questions;
