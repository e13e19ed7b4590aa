pub mod attributes;
pub mod config;
pub mod datasource;
pub mod interrupt;
pub mod output;
pub mod repository;
pub mod scoring;
