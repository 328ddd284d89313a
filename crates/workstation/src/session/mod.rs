//! Session management module.
//!
//! This module provides PTY spawning, the browser channel bridge, the
//! welcome banner and the registry of live sessions.

pub mod bridge;
pub mod pty;
pub mod registry;
pub mod welcome;

pub use bridge::{run_session, Preamble, SessionBridge};
pub use pty::{resolve_shell, Session, SessionError, SessionId, SessionStatus, ShellCommand};
pub use registry::{SessionInfo, SessionRegistry};
pub use welcome::{detect_host_tools, render_banner, WelcomeComposer};
