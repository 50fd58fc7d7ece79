pub mod core;
pub mod source;

pub use core::{run_once, ReplayResult, MAX_BATCH};
pub use source::{DlqMessage, DlqSource, LocalDlqSource};
