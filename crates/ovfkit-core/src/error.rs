//! Error types for the ovfkit core library.

use std::path::PathBuf;

/// The main error type for ovfkit operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error on a file or directory.
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    /// The document is not well-formed XML.
    #[error("XML error: {message}")]
    Xml { message: String },

    /// The document is XML but not a usable OVF descriptor.
    #[error("OVF error: {message}")]
    Ovf { message: String },

    /// A remap could not be started.
    #[error("Remap error: {message}")]
    Remap { message: String },
}

/// A specialized Result type for ovfkit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an I/O error with path context.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    /// Create an XML error.
    pub fn xml(message: impl Into<String>) -> Self {
        Self::Xml {
            message: message.into(),
        }
    }

    /// Create an OVF error.
    pub fn ovf(message: impl Into<String>) -> Self {
        Self::Ovf {
            message: message.into(),
        }
    }

    /// Create a remap error.
    pub fn remap(message: impl Into<String>) -> Self {
        Self::Remap {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::io(io_err, "/hol/lib/lab/lab.ovf");
        let msg = err.to_string();
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("/hol/lib/lab/lab.ovf"));
    }

    #[test]
    fn test_xml_error() {
        let err = Error::xml("unexpected closing tag");
        assert!(err.to_string().contains("XML error"));
        assert!(err.to_string().contains("unexpected closing tag"));
    }

    #[test]
    fn test_ovf_error() {
        let err = Error::ovf("Disk is missing ovf:diskId");
        assert!(err.to_string().contains("OVF error"));
    }

    #[test]
    fn test_remap_error() {
        let err = Error::remap("library directory does not exist");
        assert!(err.to_string().contains("Remap error"));
    }
}
