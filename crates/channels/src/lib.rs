//! Channel surfaces for Toolforge.
//!
//! Currently one surface: the Telegram-style chat bot. The transport
//! itself (long polling, webhooks) sits behind a trait so the surface
//! logic — session mapping, commands, access control, cooldowns,
//! inline-button approvals, chunking — is testable in-process.

pub mod telegram;

pub use telegram::{
    chunk_message, session_id_for_chat, BotApprovalGate, BotTransport, TelegramBot, TransportError,
};
