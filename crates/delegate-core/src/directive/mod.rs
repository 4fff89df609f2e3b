//! `@delegate:` marker scanning.

mod scanner;

pub use scanner::{scan_file, scan_text, FileDirective};
