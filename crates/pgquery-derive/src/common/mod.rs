//! Common utilities shared by the derive implementation.

pub mod syn_types;
