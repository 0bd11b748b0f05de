//! Root filesystem staging.
//!
//! Materializes the plan's layers into a staging directory in fixed order:
//! base OS, OS packages, vendored runtime dependencies, payload artifacts,
//! static data, init binary. Later layers overwrite earlier ones at
//! colliding paths.

mod stage;
pub mod vendor;

pub use stage::stage;
