// voxelstore - Rust Implementation
// Chunk persistence for voxel worlds: a tagged binary tree codec,
// sector-addressed region files and a bounded region cache.

#![warn(rust_2018_idioms)]

pub mod cache;
pub mod config;
pub mod logging;
pub mod manager;
pub mod region;
pub mod tag;

// Re-exports for convenience
pub use cache::{CacheStats, LirsCache};
pub use config::{LoggingConfig, StoreConfig};
pub use manager::{FsRegionDirectory, RegionDirectory, RegionManager};
pub use region::{CompressionMethod, RegionFile, RegionOptions, RegionPos};
pub use tag::{Compound, List, Node, NodeKind, Tree, Value};

/// voxelstore error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        /// Malformed tag, truncated stream or unknown compression method.
        #[error("Format error: {0}")]
        Format(String),

        /// A name, string or coordinate outside its allowed range.
        #[error("Range error: {0}")]
        Range(String),

        #[error("Capacity error: payload needs {sectors} sectors, at most {max} allowed")]
        Capacity { sectors: usize, max: usize },

        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Slot ({x}, {z}): {source}")]
        Slot {
            x: i32,
            z: i32,
            #[source]
            source: Box<Error>,
        },

        #[error("Region ({x}, {z}): {source}")]
        Region {
            x: i32,
            z: i32,
            #[source]
            source: Box<Error>,
        },

        /// The slot failed to decode and has been cleared.
        #[error("Corrupt slot ({x}, {z}) was cleared: {source}")]
        CorruptSlot {
            x: i32,
            z: i32,
            #[source]
            source: Box<Error>,
        },

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Internal error: {0}")]
        Internal(String),
    }

    impl Error {
        /// True when this error, or the error it wraps, is a format error.
        pub fn is_format(&self) -> bool {
            match self {
                Error::Format(_) | Error::CorruptSlot { .. } => true,
                Error::Slot { source, .. } | Error::Region { source, .. } => source.is_format(),
                _ => false,
            }
        }

        pub fn is_range(&self) -> bool {
            match self {
                Error::Range(_) => true,
                Error::Slot { source, .. } | Error::Region { source, .. } => source.is_range(),
                _ => false,
            }
        }

        pub fn is_capacity(&self) -> bool {
            match self {
                Error::Capacity { .. } => true,
                Error::Slot { source, .. } | Error::Region { source, .. } => source.is_capacity(),
                _ => false,
            }
        }

        /// Attach slot coordinates to an error.
        pub fn at_slot(self, x: i32, z: i32) -> Self {
            Error::Slot {
                x,
                z,
                source: Box::new(self),
            }
        }

        /// Attach region coordinates to an error.
        pub fn at_region(self, x: i32, z: i32) -> Self {
            Error::Region {
                x,
                z,
                source: Box::new(self),
            }
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::error::Error;

    #[test]
    fn test_error_classification_through_context() {
        let err = Error::Format("bad tag".into()).at_slot(1, 2).at_region(0, 0);
        assert!(err.is_format());
        assert!(!err.is_range());

        let err = Error::Capacity { sectors: 300, max: 255 }.at_slot(0, 0);
        assert!(err.is_capacity());
        assert!(!err.is_format());
    }

    #[test]
    fn test_error_display_carries_context() {
        let err = Error::Range("x out of range".into()).at_region(-1, 3);
        let text = err.to_string();
        assert!(text.contains("Region (-1, 3)"));
        assert!(text.contains("x out of range"));
    }
}
