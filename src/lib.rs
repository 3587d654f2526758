//! # sclkit
//!
//! Typed model and editing services for IEC 61850 SCL documents.
//!
//! ## Features
//!
//! - Owned SCL object model (IED, AccessPoint, LDevice, LN0/LN, DOI/SDI/DAI)
//! - Template resolution of dotted DO/DA references
//! - Incremental DOI/SDI/DAI creation from the point of mismatch
//! - ExtRef binding, source lookup and coherence checks
//! - GOOSE/SMV/Report control block and dataset provisioning
//! - Cardinality ceilings of server and client access points
//! - APPID, MAC-Address and VLAN assignment of GOOSE and SMV control blocks
//!
//! ## Example
//!
//! ```rust,ignore
//! use sclkit::{limits, loader};
//!
//! let scl = loader::load_str(&std::fs::read_to_string("station.scd")?)?;
//! for item in limits::analyze_data_groups(&scl) {
//!     println!("{}", item);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod names;
pub mod report;

// Document model and its XML boundary
pub mod documents;
pub mod loader;
pub mod model;

// Template and instance resolution
pub mod catalog;
pub mod ldevice;
pub mod ln;
pub mod tracker;

// Editing services
pub mod control_blocks;
pub mod extref;
pub mod limits;
pub mod network;
pub mod settings;

// Re-exports for convenience
pub use error::{Error, Result};
pub use model::Scl;
pub use report::{ReportItem, Severity};

/// Version of the sclkit library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SCL namespace
pub const SCL_NAMESPACE: &str = "http://www.iec.ch/61850/2003/SCL";
