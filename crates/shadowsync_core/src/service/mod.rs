//! Host-facing services.
//!
//! # Responsibility
//! - Turn lifecycle events into engine calls via explicit subscriptions.
//! - Expose read-only label/record queries.
//! - Keep host code decoupled from engine components and storage details.

pub mod dispatcher;
pub mod query_service;
