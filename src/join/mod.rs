//! Joining raw instrument exports into a single feature table.

pub mod merge;

pub use merge::join_tables;
