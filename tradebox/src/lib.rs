//! Tradebox - host-side image builder.
//!
//! Turns a declarative [`ImagePlan`] into a single bootable ext4 disk image:
//! stage the root filesystem tree from ordered layers, check it against the
//! declared capacity, allocate and format a backing file, populate it via a
//! temporary loop mount, and atomically commit the result.
//!
//! The guest-side counterpart (the PID-1 init the builder bakes into every
//! image) lives in the `tradebox-guest-init` crate.

pub mod builder;
pub mod disk;
pub mod plan;
pub mod rootfs;
pub mod update;
pub(crate) mod util;

pub use builder::ImageBuilder;
pub use plan::ImagePlan;
pub use tradebox_shared::{TradeboxError, TradeboxResult};
