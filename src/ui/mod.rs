//! View state for the web front end, kept free of any rendering so the
//! rules can be driven from tests and from [`crate::client::AurisClient`].

pub mod app;
pub mod audiomarks;
pub mod catalog;
pub mod player;
