//! Markdown and terminal rendering.

pub mod generator;

pub use generator::*;
