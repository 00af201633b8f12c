pub mod client;
pub mod composer;
pub mod prompts;
pub mod types;

pub use client::*;
pub use composer::*;
pub use types::*;
