//! Ephemeral containerised service dependencies for integration tests.
//!
//! `testpod` starts a disposable container from an image, waits until the
//! engine reports it running, resolves the host address its service port is
//! published on, and hands a test body a resilient connection pool against
//! that address. The container is force-removed afterwards whatever the body
//! does.
//!
//! # Modules
//!
//! - [`config`]: Layered configuration (CLI > env > file > defaults)
//! - [`endpoint`]: Port binding selection and host substitution
//! - [`engine`]: Container engine connection, image resolution and lifecycle
//! - [`error`]: Semantic error types for the library
//! - [`harness`]: The scoped provision, use and release workflow
//! - [`pool`]: Health-checked connection pool over a service endpoint
//! - [`service`]: Service client seam and the Redis implementation

pub mod config;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod harness;
pub mod pool;
pub mod service;
