// Simulated order books fed from the public book channel

pub mod book;
pub mod shared;

pub use book::{Fill, Orderbook, PriceLevel};
pub use shared::SharedOrderbook;
