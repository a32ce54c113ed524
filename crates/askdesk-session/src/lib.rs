//! Chat sessions and rate limiting.
//!
//! Sessions live in memory only and are reaped after inactivity. Each session
//! carries an async mutex so turns of one session are processed in arrival
//! order while different sessions run independently.

pub mod rate_limit;
pub mod session;

pub use rate_limit::{RateLimiter, RATE_WINDOW};
pub use session::{ChatMessage, ChatSession, Role, SessionManager, SessionStatus};
