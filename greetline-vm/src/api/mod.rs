//! HTTP handlers for greetline-vm

pub mod buildinfo;
pub mod greeting;
pub mod health;
pub mod signature;
pub mod webhooks;

pub use buildinfo::get_build_info;
pub use greeting::get_greeting;
pub use health::health_routes;
pub use signature::signature_middleware;
pub use webhooks::{call_status, handle_key, receive_message, receive_voice, set_greeting_track};
