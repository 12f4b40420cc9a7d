//! Payment gate: quote, pay, validate

pub mod builder;
pub mod chain;
pub mod client;

pub use builder::PaymentClientBuilder;
pub use chain::SignerChain;
pub use client::{PaymentClient, PaymentClientConfig, Quote};
