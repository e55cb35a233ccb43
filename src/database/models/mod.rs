pub mod invite;
pub mod join_request;
pub(crate) mod macros;
pub mod settings;
pub mod status;
pub mod team;

// Re-export all models for easy importing
pub use invite::*;
pub use join_request::*;
pub use settings::*;
pub use status::*;
pub use team::*;
