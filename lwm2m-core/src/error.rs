//! Error types for observation state changes

/// Errors reported synchronously by [`ResourceBase`](crate::base::ResourceBase)
/// setters. Nothing in this crate panics on bad input; every rejection comes
/// back to the immediate caller.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// observation cannot begin on a resource that was never marked observable
    #[error("resource {name:?} is not observable")]
    NotObservable {
        /// resource name
        name: String,
    },
    /// token exceeds the CoAP token size limit
    #[error("observation token of {len} bytes exceeds the {max} byte limit")]
    TokenTooLong {
        /// offered token length
        len: usize,
        /// maximum accepted length
        max: usize,
    },
    /// caller-supplied buffer cannot hold the token
    #[error("buffer holds {capacity} bytes but the token needs {needed}")]
    BufferTooSmall {
        /// bytes required
        needed: usize,
        /// bytes available
        capacity: usize,
    },
}

/// Convenience alias for results in this crate
pub type Result<T> = std::result::Result<T, Error>;
