pub mod config;
pub mod dto;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod scheduler;
pub mod service;
