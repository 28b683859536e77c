//! Board model, move planner, and store wire protocol for Klyra.

pub mod audit;
pub mod board;
pub mod list;
pub mod planner;
pub mod store;
