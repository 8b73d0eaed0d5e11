#![doc = "Timing core for the power sampler."]

pub mod acquisition;
pub mod analyzer;
pub mod realtime;
pub mod scheduler;

pub use acquisition::*;
pub use analyzer::*;
pub use realtime::*;
pub use scheduler::*;
