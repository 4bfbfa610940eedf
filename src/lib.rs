pub mod alpha;
pub mod commands;
pub mod config;
pub mod dataset;
pub mod error;
pub mod features;
pub mod gbdt;
pub mod indicators;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod polygon;
pub mod portfolio;
pub mod series;
pub mod server;
