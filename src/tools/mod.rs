//! Portion Geometry tools module
//!
//! MCP tool implementations over the estimation pipeline.

pub mod estimation;
pub mod sessions;
pub mod status;
