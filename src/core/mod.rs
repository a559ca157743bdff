//! Core functionality for documents, paths, configuration and storage

pub mod config;
pub mod document;
pub mod path;
pub mod store;
