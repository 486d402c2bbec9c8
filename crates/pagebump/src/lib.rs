//! pagebump library: application logic for the `pagebump` binary.

pub mod app;
pub mod completion;
pub mod config;
pub mod errors;
pub mod output;
pub mod split;
pub mod version;
