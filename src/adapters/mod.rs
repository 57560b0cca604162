pub mod coingecko;
pub mod order_gateway;
pub mod postgres;

pub use coingecko::CoinGeckoClient;
pub use order_gateway::{HttpOrderGateway, PaperOrderGateway};
pub use postgres::PostgresStore;
