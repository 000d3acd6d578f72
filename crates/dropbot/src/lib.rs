//! Telegram front end for the dropcore orchestrator.

pub mod cli;
pub mod telegram;
