//! rgsearch - Cancellable file and text search streamed from ripgrep.
//!
//! This library drives an external `rg` process, decodes its output as it
//! arrives, and hands results to the caller one by one. Every search can be
//! cancelled, and a failed search reports ripgrep's own reason.
//!
//! # Modules
//!
//! - [`provider`] - Entry point: streaming searches and shutdown
//! - [`search`] - Engines, process supervision, decoding and classification
//! - [`commands`] - The `files` and `text` CLI commands
//! - [`config`] - Configuration loading
//! - [`cli`] - Command-line interface definitions

pub mod cli;
pub mod commands;
pub mod config;
pub mod provider;
pub mod search;
