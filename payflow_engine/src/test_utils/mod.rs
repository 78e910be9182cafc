//! Helpers for integration tests: disposable databases and scripted collaborators.
pub mod mocks;
pub mod prepare_env;
