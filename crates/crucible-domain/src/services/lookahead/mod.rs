pub mod shuffle;
pub mod static_scan;

pub use shuffle::{shuffle_test, ShuffleConfig, ShuffleReport};
pub use static_scan::{scan, Violation, ViolationKind};
