//! Request handlers.

pub mod auth;
pub mod bills;
pub mod customers;
pub mod health;
pub mod prices;
pub mod users;
