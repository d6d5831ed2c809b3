#![warn(missing_docs)]

//! Common holds the hardware plumbing shared between the CPU meter crates
//! which is not specific to any one device, such as access to the processor's
//! GPIO banks.

/// All structs and definitions related to talking to on-board peripherals.
pub mod comm;
