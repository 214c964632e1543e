mod rest;

pub use rest::{to_exchange_symbol, BinanceClient};
