//! Test support utilities for dispatcher integration tests

pub mod mock_backend;

pub use mock_backend::MockBackend;
