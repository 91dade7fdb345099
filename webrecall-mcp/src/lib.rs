#![allow(clippy::missing_errors_doc)]

//! # webrecall MCP
//!
//! The tool interface: line-delimited JSON-RPC 2.0 on stdin/stdout with the
//! MCP methods `initialize`, `tools/list`, and `tools/call`. Tool calls run
//! against a local [`webrecall_core::engine::RecallEngine`], or are
//! forwarded to a remote webrecall API in client mode.

pub mod dispatch;
pub mod jsonrpc;
pub mod protocol;
pub mod remote;
pub mod server;
pub mod tools;

pub use dispatch::{dispatch, ToolBackend};
pub use remote::RemoteClient;
pub use server::serve_stdio;
