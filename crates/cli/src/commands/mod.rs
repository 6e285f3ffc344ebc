pub mod chat;
pub mod sessions_cmd;
pub mod tool;
