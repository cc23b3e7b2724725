//! Acceptance tests for the Endform HMI gateway.
//!
//! These tests drive the HTTP router end to end against the simulated
//! controller:
//! - Connection status, heartbeat discovery, and target changes
//! - Tag reads, boolean writes, pulses, and indexed I/O
//! - Program validation and download into the step arrays
//! - Recipe storage

mod acceptance;
