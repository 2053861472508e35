use thiserror::Error;

/// Errors surfaced by the CMAC engine.
///
/// None of these are recovered internally: a session that returns any of
/// them is terminal and must be discarded by the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CmacError {
    /// The block-cipher engine reported a failure. `status` is the raw code
    /// returned by the engine.
    #[error("block cipher engine fault (status {status:#x})")]
    EngineFault {
        /// Engine status code, passed through unchanged.
        status: u32,
    },

    /// The API was used with an invalid argument combination.
    #[error("precondition failed: {0}")]
    PreconditionFailed(&'static str),

    /// A call arrived in a state that does not accept it.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The contiguity provider could not find a usable run at `addr`.
    #[error("unsupported memory region at {addr:#x}")]
    UnsupportedRegion {
        /// Start address of the span that could not be split.
        addr: usize,
    },
}

/// Crate result alias.
pub type Result<T> = core::result::Result<T, CmacError>;
