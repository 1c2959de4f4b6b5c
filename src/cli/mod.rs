//! CLI interface module
//!
//! This module contains all command-line interface components including:
//! - Command definitions (`types`) and handlers (`commands`)
//! - Terminal output formatting (`display`: tables, detail views, colors)
//! - Progress bars and stage-tree rendering (`output`)

pub mod commands;
pub mod display;
pub mod output;
pub mod types;
