//! Ext4 sizing constants for the capacity check.

/// Ext4 block size in bytes.
pub const BLOCK_SIZE: u64 = 4096;

/// Ext4 inode size in bytes.
pub const INODE_SIZE: u64 = 256;
