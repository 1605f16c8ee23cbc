// tests/integration/mod.rs

//! End-to-end tests over real loopback sockets.

pub mod admin_flow_test;
pub mod client_flow_test;
pub mod concurrency_test;
pub mod test_helpers;
