//! Package sources.
//!
//! A source turns a packages directory into package descriptors.

pub mod descriptor;

pub use descriptor::{DescriptorSource, TomlDescriptorSource, DESCRIPTOR_FILE_NAME};
