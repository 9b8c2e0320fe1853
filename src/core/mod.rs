//! Foundational types shared by every layer of the engine.

pub mod asset;
pub mod audit;
pub mod decimal;
pub mod error;
pub mod scope;
pub mod transaction;
