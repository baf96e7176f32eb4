//! Filesystem utilities for opgate.

pub mod atomic;

pub use atomic::atomic_write;
