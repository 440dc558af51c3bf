//! Unit tests for testpod configuration.
//!
//! - [`helpers`] - Shared fixtures and helper functions
//! - [`types_tests`] - Section defaults and conversions
//! - [`layer_precedence_tests`] - `MergeComposer` layer precedence tests
//! - [`loader_tests`] - File and environment loading through `load_config_with_env`

mod helpers;
