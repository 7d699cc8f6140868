pub mod producer;
pub mod receiver;
pub mod sender;
