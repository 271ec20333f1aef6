//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `relaymq` crate.
//!
//! It centralizes the error taxonomy and the logging initialization helper
//! so that every other module reports failures the same way.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        // Should not panic
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
    }
}
