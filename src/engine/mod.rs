//! Pricing, profit matching and the operation pipeline.

pub mod calculator;
pub mod matching;
pub mod orchestrator;
pub mod service;
