//! Morph - rule-driven transformation of hierarchical record streams.
//!
//! This library provides the core functionality for morph, including:
//! - Multi-pattern literal matching (Aho-Corasick) and text replacement
//! - Wildcard path matching for rule sources
//! - The rule pipeline of functions and collectors
//! - The record walker feeding literals into the pipeline
//! - Configuration file parsing and cascade discovery
//!
//! # Example
//!
//! ```no_run
//! use morph_cli::config::{build_morph, load_merged_config};
//! use morph_cli::morph::StreamEvent;
//!
//! let cwd = std::env::current_dir().unwrap();
//! let config = load_merged_config(&cwd).unwrap();
//! let mut morph = build_morph(&config).unwrap();
//!
//! let records = morph
//!     .process(vec![
//!         StreamEvent::StartRecord("1".to_string()),
//!         StreamEvent::literal("title", "Dune"),
//!         StreamEvent::EndRecord,
//!     ])
//!     .unwrap();
//! println!("{:?}", records[0].literals);
//! ```

pub mod config;
pub mod error;
pub mod morph;
pub mod pipeline;
pub mod records;
pub mod tries;

pub use error::{MorphError, Result};
