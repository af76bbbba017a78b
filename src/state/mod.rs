/// State management module
///
/// This module handles the persistent catalog:
/// - Shared data structures (data.rs)
/// - Database connection, schema and queries (library.rs)

pub mod data;
pub mod library;
