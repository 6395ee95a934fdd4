#![forbid(unsafe_code)]

//! Test harness and reference fixtures for trax.

pub mod log_fmt;
pub mod todo;
