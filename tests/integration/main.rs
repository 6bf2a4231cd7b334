//! Integration tests

mod common;
mod fault_tests;
mod finalize_tests;
mod lifecycle_tests;
mod storage_tests;
