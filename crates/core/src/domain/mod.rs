pub mod analysis;
pub mod conversation;
pub mod workflow;
