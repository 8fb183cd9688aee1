#![doc = include_str!("../../../README.md")]
//!

//! This crate re-exports the `nestfit-core` library under a single name, for
//! use by the command-line tool and the Python module.

pub use nestfit_core::*;
