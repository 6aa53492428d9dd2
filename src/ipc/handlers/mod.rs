pub mod activities;
pub mod analytics;
pub mod auth;
pub mod core;
pub mod events;
pub mod files;
pub mod notifications;
pub mod portfolio;
pub mod users;
