pub mod clean;
pub mod config;
pub mod doctor;
pub mod serve;
pub mod setup_models;
