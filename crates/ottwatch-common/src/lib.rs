//! Shared plumbing for the ottwatch crates: data-directory layout and
//! atomic JSON persistence.

pub mod paths;
pub mod persist;
