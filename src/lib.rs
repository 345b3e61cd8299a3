pub mod app;
pub mod config;
pub mod data_url;
pub mod db;
pub mod errors;
pub mod export;
pub mod generator;
pub mod history;
pub mod i18n;
pub mod llm;
pub mod models;
pub mod render;
pub mod router;
pub mod session;
pub mod settings;

pub use app::{App, Banner};
pub use config::Config;
