//! Network transports for incoming tunnel connections.

pub mod websocket;
