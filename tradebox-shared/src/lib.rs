//! Tradebox shared - code common to the host-side image builder and the
//! guest init process.
//!
//! Everything in this crate sits on the host/guest boundary: the guest
//! filesystem layout the builder bakes and init relies on, the boot-time
//! contract with the VM monitor, and the error taxonomy.

pub mod constants;
pub mod errors;
pub mod layout;

pub use errors::{TradeboxError, TradeboxResult};
