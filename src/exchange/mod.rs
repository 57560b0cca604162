pub mod traits;

pub use traits::{MarketData, OrderGateway};

#[cfg(test)]
pub use traits::{MockMarketData, MockOrderGateway};
