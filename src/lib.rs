// Library root
// ------------
// Everything the `homebox-cli` binary does is available as a library so
// the client and the bulk operations can be driven (and tested) without a
// terminal.
//
// Module responsibilities:
// - `api`: HTTP transport seam and the authenticated `Client`.
// - `models`: typed Homebox payloads.
// - `paths`: nested-location path resolution and search.
// - `bulk`: CSV import/export with per-row reporting.
// - `config`: credentials file and overrides.
// - `cli` / `ui`: argument parsing, dispatch and terminal output.
pub mod api;
pub mod bulk;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod paths;
pub mod ui;

pub use api::{Client, HttpTransport, Transport};
pub use error::{Error, Result};
