//! HTTP acceptance tests.
//!
//! Each test builds a fresh router over its own simulated controller and
//! recipe directory, so tests are independent and need no network.

mod api_test;
mod common;
mod program_test;
mod recipe_test;
