//! slsform Core
//!
//! Core library for managing log service resources: the resource model,
//! the provider contract, and the retry/poll primitives every resource
//! handler uses to wait for an eventually-consistent API

pub mod differ;
pub mod effect;
pub mod identifier;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod wait;
