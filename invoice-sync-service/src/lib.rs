pub mod assembler;
pub mod audit;
pub mod checkout;
pub mod client;
pub mod config;
pub mod handlers;
pub mod links;
pub mod models;
pub mod orchestrator;
pub mod overrides;
pub mod scheduler;
pub mod services;
pub mod settings;
pub mod startup;
pub mod triggers;
pub mod vies;

pub use startup::{AppState, Application};
