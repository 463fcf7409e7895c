// src/core/mod.rs

// Root of the `core` module: the scan engine and everything it needs,
// from input validation to storage.

/// Findings, scan results, requests and responses.
pub mod models;

pub mod errors;

/// Input checks applied before any network traffic.
pub mod validation;

/// The analyzer trait, the concurrent fan-out and both scan pipelines.
pub mod scanner;

pub mod scoring;

/// OWASP categories and the advisory strings used for recommendations.
pub mod knowledge_base;

pub mod persistence;

pub mod service;
