//! Reporter module for output formatting

pub mod console;
pub mod json;
pub mod svg;

pub use console::ConsoleReporter;
pub use json::JsonReporter;
