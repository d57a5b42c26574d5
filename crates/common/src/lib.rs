pub mod config;
pub mod db;
pub mod error;
pub mod repository;
pub mod types;
