//! Disk image operations.
//!
//! - `PendingImage` - RAII guard for a backing file under construction
//! - `estimate_tree_size` - ext4 footprint estimate for the capacity check
//! - `allocate` / `format` / `populate` - the ordered image pipeline steps

pub mod constants;
pub(crate) mod ext4;
mod image;

pub use ext4::{estimate_tree_size, format, populate};
pub use image::PendingImage;
