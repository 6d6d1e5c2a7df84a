//! Error handling.

/// An error that may occur when working with known_hosts files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error related to type information occurred.
    #[error("Type error: {0}")]
    Algorithm(#[from] crate::algorithm::Error),

    /// A known_hosts line can not be decoded.
    #[error("Decoding error: {0}")]
    Decode(#[from] crate::codec::DecodeError),

    /// A known_hosts line can not be encoded.
    #[error("Encoding error: {0}")]
    Encode(#[from] crate::codec::EncodeError),

    /// An entry can not be created.
    #[error("Entry error: {0}")]
    Entry(#[from] crate::entry::Error),

    /// A known_hosts file can not be loaded.
    #[error("Load error: {0}")]
    Load(#[from] crate::file::LoadError),

    /// A host pattern can not be created.
    #[error("Host pattern error: {0}")]
    Pattern(#[from] crate::pattern::Error),

    /// A known_hosts file can not be saved.
    #[error("Save error: {0}")]
    Save(#[from] crate::file::SaveError),

    /// An entry store can not be accessed.
    #[error("Entry store error: {0}")]
    Store(#[from] crate::store::Error),
}
