//! Trade orchestration: the engine and its settlement collaborator

mod settlement;
pub mod trader;

pub use trader::TradeEngine;
