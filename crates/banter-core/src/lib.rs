//! # banter-core
//!
//! Foundation types shared by every banter crate:
//!
//! - Branded ID newtypes (`UserId`, `ConnectionId`, `RoomId`, `MessageId`)
//! - Domain types (`Identity`, `ChatMessage`, `Room`, `Role`)
//! - The gateway error taxonomy with stable codes and user-facing messages

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod message;

pub use errors::GatewayError;
pub use ids::{ConnectionId, MessageId, RoomId, UserId};
pub use message::{ChatMessage, Identity, Role, Room};
