pub mod events;
pub mod media;
pub mod rest;
pub mod webhook;

#[cfg(test)]
pub(crate) mod fake;
