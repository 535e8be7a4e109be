//! Duplicate feature removal within per-group ordinal windows.

pub mod resolve;
pub mod window;

pub use resolve::{
    remove_duplicates, remove_duplicates_with, remove_duplicates_with_stats, AmbiguityPolicy,
    DedupResult,
};
pub use window::{Window, WindowSpec};
