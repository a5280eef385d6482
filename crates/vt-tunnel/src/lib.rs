//! vt-tunnel: The SSH-over-WebSocket bridge
//!
//! Prepares the VM side (sshd + relay under supervisord), builds the local
//! ssh invocation that uses a WebSocket relay as its transport, and
//! supervises that ssh process on the controlling terminal.

pub mod bootstrap;
pub mod command;
pub mod preflight;
pub mod supervisor;

pub use bootstrap::Bootstrapper;
pub use command::TunnelCommand;
pub use preflight::{check_binaries, LocalBinaries};
pub use supervisor::{classify_exit, ForwardSignal, SignalListener, Supervisor};
