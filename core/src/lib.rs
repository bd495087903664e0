pub mod bus;
pub mod db;
pub mod engine;
pub mod error;
pub mod locks;
pub mod models;
pub mod resolver;
pub mod service;
pub mod store;
