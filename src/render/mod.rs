//! Render sinks for the CLI views.

pub mod terminal;

pub use crate::correlator::{RenderSink, RowKind};
pub use terminal::TerminalSink;
