pub mod error;
pub mod outbound;
pub mod status;
