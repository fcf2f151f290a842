//! Types and plumbing shared by the protocol client and the engine

pub mod channels;
pub mod errors;
pub mod traits;
pub mod types;
