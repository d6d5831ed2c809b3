/// Memory-mapped GPIO banks and the pins driven through them.
#[cfg(feature = "gpio")]
pub mod gpio;
