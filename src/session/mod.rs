//! User session gate
//!
//! Every run validates the user's session before touching the cache. The
//! user record lives in `~/.crosbyconf` and is only read or written here.

pub mod gate;
pub mod identity;

pub use gate::{
    create_gate, gate_enabled, interpret, DisabledGate, HttpSessionGate, SessionGate, SessionReply,
    SessionStatus,
};
pub use identity::{IdentityFile, User};
