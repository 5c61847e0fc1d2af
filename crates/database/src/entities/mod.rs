//! Domain entities for the database layer

pub mod message;
pub mod room;
pub mod user;

pub use message::{format_timestamp, parse_timestamp, ChatMessage};
pub use room::Room;
pub use user::User;
