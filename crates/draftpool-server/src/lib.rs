// Draftpool server library: configuration, wire protocol, request dispatch
// and the WebSocket transport. The `draftpool` binary wires these together.

pub mod config;
pub mod handler;
pub mod protocol;
pub mod ws_server;
