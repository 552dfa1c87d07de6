//! Integration tests for stagecraft

mod cli_tests;
mod pipeline_tests;
mod support;
