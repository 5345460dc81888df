//! # Application Module
//!
//! ## Submodules
//!
//! - [`tooling`] - Transports, capability registry, routing and the [`tooling::ToolHost`] facade
//! - [`agent`] - The conversation engine driving model/tool turns
//! - [`workflow`] - Sequential and dynamic multi-agent drivers

pub mod agent;
pub mod tooling;
pub mod workflow;
