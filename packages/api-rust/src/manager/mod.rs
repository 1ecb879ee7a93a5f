//! Conductor managers that run in this process.

pub mod clock;
pub mod memory;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use memory::MemoryManager;
