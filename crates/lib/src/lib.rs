//! wheelwright-lib: core logic for the `wright` build frontend
//!
//! This crate provides the building blocks the CLI is assembled from:
//! - `backend`: backend spec parsing and selection
//! - `build`: the frontend that invokes a backend inside an isolated runtime
//! - `install`: wheel installation into a staged root
//! - `verify`: source/bytecode consistency checking of installed trees

pub mod backend;
pub mod build;
pub mod bytecode;
pub mod consts;
pub mod install;
pub mod lua;
pub mod manifest;
pub mod scheme;
pub mod verify;
