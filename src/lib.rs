// ABOUTME: Library root for skiff - blue-green container deployment over SSH.
// ABOUTME: The binary in main.rs only parses arguments and wires these modules together.

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod exec;
pub mod health;
pub mod hooks;
pub mod output;
pub mod preflight;
pub mod security;
pub mod ssh;
pub mod types;
