//! TestContext - owns the temporary store directory of one test
//!
//! Every test gets its own directory, so store files never collide when
//! tests run in parallel. The directory is removed when the context drops.

use crate::{Error, Result};
use std::path::Path;
use tempfile::TempDir;

/// Temporary directory for one test's store files
///
/// # Example
///
/// ```rust,no_run
/// use kestrel_core::testing::{GraphFixture, TestContext};
///
/// let ctx = TestContext::new();
/// let fixture = GraphFixture::open(ctx.path()).unwrap();
/// // store files are removed when ctx is dropped
/// ```
#[derive(Debug)]
pub struct TestContext {
    temp_dir: TempDir,
}

impl TestContext {
    /// Create a context with a fresh directory
    ///
    /// # Panics
    ///
    /// Panics when no temporary directory can be created; use
    /// [`try_new`](Self::try_new) outside of tests.
    pub fn new() -> Self {
        match Self::try_new() {
            Ok(ctx) => ctx,
            Err(e) => panic!("Failed to create test directory: {}", e),
        }
    }

    /// Create a context, reporting I/O failures
    pub fn try_new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        // ensure the directory exists before any store is opened in it
        std::fs::create_dir_all(temp_dir.path())
            .map_err(|e| Error::storage(format!("Failed to create test directory: {}", e)))?;
        Ok(Self { temp_dir })
    }

    /// Directory for store files; exists until the context drops
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Keep the directory alive beyond the context
    pub fn into_temp_dir(self) -> TempDir {
        self.temp_dir
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_context_creates_directory() {
        let ctx = TestContext::new();
        assert!(ctx.path().is_dir());
    }

    #[test]
    fn test_context_path_is_writable() {
        let ctx = TestContext::new();
        let test_file = ctx.path().join("nodes.store");
        fs::write(&test_file, [0u8; 32]).unwrap();
        assert!(test_file.exists());
    }

    #[test]
    fn test_context_cleanup_on_drop() {
        let path = {
            let ctx = TestContext::new();
            ctx.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
