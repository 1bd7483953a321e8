//! Content hashing for iopack.
//!
//! Chunk payloads, global names and circular import chains are all hashed with
//! BLAKE3 under distinct domain tags, so equal bytes hashed for different
//! purposes never produce equal digests.

pub mod hasher;

pub use hasher::ContentHasher;
