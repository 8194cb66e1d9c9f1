pub mod timer;

pub use timer::{HighPrecisionTimer, ManualClock, TickStats, Timer};
