//! Pipeline steps, each enabled by its own command-line flag.
pub mod analysis;
pub mod download;
pub mod linkedin;
pub mod mapping;
pub mod validation;
