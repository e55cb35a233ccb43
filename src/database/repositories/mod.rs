//! Postgres queries, one free function per statement.
//!
//! Everything except the user lookups runs on a caller-owned transaction.

pub mod invite;
pub mod join_request;
pub mod member;
pub mod settings;
pub mod team;
pub mod user;
