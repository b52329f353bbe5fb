//! Palaver is a terminal client for hosted AI assistants that run tools,
//! cite reference files, and generate files of their own.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the Assistants wire payloads and the [`api::AssistantsApi`]
//!   seam with its HTTP implementation.
//! - [`core`] owns the session manager (threads, runs, polling), the local
//!   tool registry, footnote rewriting, assistant registration, file
//!   delivery, and configuration.
//! - [`ui`] renders the terminal interface and runs the interactive event loop.
//! - [`auth`] resolves API keys from the environment, config, or keyring.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`], which dispatches into [`ui::chat_loop`] for
//! interactive sessions or [`cli::say`] for one-shot use.

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
