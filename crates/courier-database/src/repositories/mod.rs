//! Concrete repository implementations, one per entity.

pub mod chat;
pub mod contact;
pub mod message;
pub mod user;

pub use chat::ChatRepository;
pub use contact::ContactRepository;
pub use message::MessageRepository;
pub use user::UserRepository;
