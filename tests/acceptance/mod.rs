//! Integration tests for power sampler acceptance testing.

mod common;
mod environment_test;
mod scheduler_test;
mod session_test;
