pub mod access;
pub mod catalog;
pub mod config;
pub mod error;
pub mod executor;
pub mod storage;
pub mod transaction;
