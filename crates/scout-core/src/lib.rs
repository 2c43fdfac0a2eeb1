pub mod backend;
pub mod config;
pub mod controller;
pub mod logging;
pub mod models;
pub mod mutation;
pub mod orchestration;
pub mod persistence;
pub mod sqlite;
pub mod sync;
pub mod view;
