//! Error types for identity provisioning

use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while provisioning cryptographic identities
#[derive(Error, Debug)]
pub enum CoreError {
    /// Reading credential material from disk failed
    #[error("failed to read credential file: {0}")]
    Io(#[from] std::io::Error),

    /// The PKCS#12 bundle could not be decoded (corrupt archive or wrong
    /// passphrase)
    #[error("failed to decode PKCS#12 bundle: {0}")]
    Pkcs12Decode(String),

    /// A PEM file contained no block of the expected type
    #[error("invalid PEM data for {0}")]
    InvalidPem(&'static str),

    /// The private key uses an algorithm this server does not support
    #[error("unsupported private key algorithm: {0}")]
    UnsupportedKeyAlgorithm(String),

    /// The certificate and private key are not a matching pair
    #[error("push certificate and private key do not match")]
    KeyMismatch,

    /// The push topic (UserID OID) is absent from the certificate subject
    /// or is not a string attribute
    #[error("could not find push topic (UserID OID) in certificate subject")]
    TopicNotFound,

    /// An OpenSSL operation failed
    #[error("crypto error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),
}
