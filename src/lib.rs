//! archlink: Post Resolution and Backlinks for Imageboard Archives
//!
//! Resolves quoted posts across archive families, keeps a per-page quote graph,
//! renders backlinks and expands quoted posts inline, with a bounded cache in
//! front of every archive API.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dom;
pub mod error;
pub mod expand;
pub mod fetch;
pub mod graph;
pub mod highlight;
pub mod logging;
pub mod model;
pub mod render;
pub mod session;
pub mod site;
pub mod state;
pub mod watch;
