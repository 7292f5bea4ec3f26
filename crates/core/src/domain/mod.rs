pub mod claims;
pub mod intent;
pub mod message;
pub mod thread;
