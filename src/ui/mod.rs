//! Terminal UI layer for interactive chat sessions.
//!
//! - [`chat_loop`]: terminal setup and the loop that multiplexes key input
//!   with session events.
//! - [`view`]: conversation state folded from [`crate::core::session::SessionEvent`]s.
//! - [`renderer`]: frame layout for the transcript pane and input box.
//!
//! Ownership boundary: this layer presents and captures interaction state, while
//! [`crate::core`] owns domain logic and remote coordination.

pub mod chat_loop;
pub mod renderer;
pub mod view;
