//! File actions module.
//!
//! This module applies a [`Resolution`](crate::duplicates::Resolution) to
//! disk: every file that loses records is rewritten in place through a
//! temporary file and an atomic rename.
//!
//! ```no_run
//! use jsondupe::actions::{execute, RewriteConfig};
//! use jsondupe::duplicates::Resolution;
//! use std::collections::BTreeMap;
//! use std::path::Path;
//!
//! let resolution = Resolution::default();
//! let result = execute(
//!     Path::new("data"),
//!     &resolution,
//!     &BTreeMap::new(),
//!     &RewriteConfig::default(),
//! );
//! println!("{}", result.summary());
//! ```

pub mod rewrite;

pub use rewrite::{
    execute, rewrite_file, BatchRewriteResult, FileRewriteResult, RewriteConfig, RewriteError,
};
