//! Portion Geometry Library
//!
//! Depth-based food volume estimation, calorie conversion with propagated
//! uncertainty, and multi-source fusion.

pub mod build_info;
pub mod config;
pub mod geometry;
pub mod mcp;
pub mod models;
pub mod nutrition;
pub mod stats;
pub mod tools;
pub mod uncertainty;
