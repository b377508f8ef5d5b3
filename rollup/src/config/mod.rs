// This module handles configuration parsing, validation and source resolution.

pub mod processed; // Structs representing validated and processed configuration
pub mod raw; // Structs directly mapping to the YAML structure
pub mod resolver;

pub use processed::{process_raw_config, ConfigInternal, HandlerBinding};
pub use resolver::{ConfigResolver, EffectiveConfig, Resolution};
