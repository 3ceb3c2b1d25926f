//! Application layer: the interactive session loop.

pub mod line_input;
pub mod session;

pub use line_input::{BoundedLines, InputLine};
pub use session::{run_session, SessionEnd, SessionOptions};
