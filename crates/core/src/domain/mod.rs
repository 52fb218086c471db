pub mod attachment;
pub mod conversation;
pub mod session;
pub mod ticket;
