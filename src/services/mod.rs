//! Service layer
//!
//! Infrastructure concerns (decoding, encoding, file access) kept apart
//! from the pipeline stages.

pub mod io;

pub use io::ImageIOService;
