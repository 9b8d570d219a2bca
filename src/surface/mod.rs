//! Chat and voice screens, modelled without a widget toolkit.
//!
//! Each surface owns a presentation queue. Background sources (the transport
//! reader, the speech worker, router handlers) only post to it; the owner
//! drains it with `pump` from its single presentation context.

mod chat;
mod presentation;
mod voice;


pub use chat::ChatSurface;
pub use presentation::{
    presentation_channel, ChatLog, ChatMessage, UiEvent, UiHandle, UiInbox, SENDER_DEVICE,
    SENDER_VOICE, SENDER_YOU,
};
pub use voice::VoiceSurface;
