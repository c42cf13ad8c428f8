/// Athena Portal - university academic portal backend
///
/// Role-based access control, a moderated pending-change workflow for
/// student records, and an append-only audit trail over SQLite.

pub mod access;
pub mod account;
pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod entities;
pub mod error;
pub mod ledger;
pub mod moderation;
pub mod server;
