pub mod asset;
pub mod backends;
pub mod cache;
pub mod coach;
pub mod config_loader;
pub mod controller;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod recorder;
pub mod service;
pub mod single_flight;
pub mod voices;
pub mod wav;
