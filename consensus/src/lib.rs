// Ouroboros-style slot scheduling
// Slot/epoch clock, stakeholder registry, deterministic leader election

pub mod scheduler;

pub use scheduler::*;
