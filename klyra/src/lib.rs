//! `Klyra` — board controller and persistence synchronizer for project boards.

pub mod config;
pub mod controller;
pub mod store;
pub mod sync;
