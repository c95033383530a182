pub mod client;
pub mod response;
pub mod sign;

pub use client::MarketplaceClient;
