pub mod api;
pub mod cache;
pub mod checker;
pub mod config;
pub mod crawler;
pub mod data_models;
pub mod db;
pub mod extractor;
pub mod feed;
pub mod fetcher;
pub mod jobs;
pub mod scorer;
