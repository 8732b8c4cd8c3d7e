//! Overlay asset stores and surface openers.

pub mod bitmap;
pub mod mock;
