//! Shared infrastructure for celldistill crates.
//!
//! Currently this is the error type: every failure in training or
//! prediction surfaces as a [`CellDistillError`] with an actionable hint,
//! a stable code and an [`ErrorCategory`].

pub mod error;

pub use error::{CellDistillError, ErrorCategory, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_has_actionable_message() {
        let err = CellDistillError::ConfigNotFound { path: "/path/to/predict.yaml".into() };
        let msg = err.to_string();
        assert!(msg.contains("predict.yaml"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_result_alias_propagates() {
        fn inner() -> Result<()> {
            Err(CellDistillError::Internal { message: "x".into() })
        }
        fn outer() -> Result<u8> {
            inner()?;
            Ok(1)
        }
        assert_eq!(outer().unwrap_err().code(), "E999");
    }
}
