//! Authentication module for the ad-watch server
//!
//! The chat front end authenticates users itself and hands this server a
//! signed bearer token whose subject is the chat-platform user id.

mod extractor;
mod service;

pub use extractor::AuthenticatedUser;
pub use service::{Claims, TokenService};
