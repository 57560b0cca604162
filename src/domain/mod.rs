pub mod coin;
pub mod order;
pub mod portfolio;

pub use coin::*;
pub use order::*;
pub use portfolio::*;
