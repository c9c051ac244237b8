// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types

use std::fmt;

/// Asset error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    /// The asset can never be loaded until its source changes
    InvalidAsset { initializer: String, reason: String },

    /// The asset is still being built (disk I/O or background compile in flight)
    PendingAsset { initializer: String, reason: String },

    /// Structural parse failure
    FormatError(String),

    /// Data is well formed but uses a format we can't read
    UnsupportedFormat(String),

    /// Generic failure raised by an asset constructor
    Construction(String),

    /// Background construction was requested without a compiler installed
    NoCompiler { compile_type: u64 },

    /// No compile function registered for this compile type
    UnknownCompileType(u64),

    /// A type code is already registered for a different asset type
    TypeCodeMismatch {
        type_code: u64,
        registered: String,
        requested: String,
    },

    /// Configuration could not be read or parsed
    ConfigError(String),

    /// IO error (file operations, etc.)
    IoError(String),
}

impl AssetError {
    pub fn invalid(initializer: impl Into<String>, reason: impl Into<String>) -> Self {
        AssetError::InvalidAsset {
            initializer: initializer.into(),
            reason: reason.into(),
        }
    }

    pub fn pending(initializer: impl Into<String>, reason: impl Into<String>) -> Self {
        AssetError::PendingAsset {
            initializer: initializer.into(),
            reason: reason.into(),
        }
    }

    /// Recoverable by re-polling or stalling
    pub fn is_pending(&self) -> bool {
        matches!(self, AssetError::PendingAsset { .. })
    }

    /// Terminal until the underlying source changes
    pub fn is_invalid(&self) -> bool {
        matches!(
            self,
            AssetError::InvalidAsset { .. }
                | AssetError::FormatError(_)
                | AssetError::UnsupportedFormat(_)
        )
    }
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetError::InvalidAsset {
                initializer,
                reason,
            } => write!(f, "Invalid asset: {initializer}. More information: {reason}"),
            AssetError::PendingAsset {
                initializer,
                reason,
            } => write!(f, "Pending asset: {initializer} ({reason})"),
            AssetError::FormatError(msg) => write!(f, "Format error: {msg}"),
            AssetError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            AssetError::Construction(msg) => write!(f, "Construction failed: {msg}"),
            AssetError::NoCompiler { compile_type } => {
                write!(f, "No intermediate compiler installed (compile type {compile_type:#x})")
            }
            AssetError::UnknownCompileType(code) => {
                write!(f, "No compile function registered for type {code:#x}")
            }
            AssetError::TypeCodeMismatch {
                type_code,
                registered,
                requested,
            } => write!(
                f,
                "Type code {type_code:#x} is registered for {registered}, not {requested}"
            ),
            AssetError::ConfigError(msg) => write!(f, "Config error: {msg}"),
            AssetError::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for AssetError {}

impl From<std::io::Error> for AssetError {
    fn from(err: std::io::Error) -> Self {
        AssetError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for AssetError {
    fn from(err: serde_json::Error) -> Self {
        AssetError::ConfigError(err.to_string())
    }
}

/// Build an [`AssetError::FormatError`] from format arguments
#[macro_export]
macro_rules! format_error {
    ($($arg:tt)*) => {
        $crate::error::AssetError::FormatError(format!($($arg)*))
    };
}

/// Build an [`AssetError::UnsupportedFormat`] from format arguments
#[macro_export]
macro_rules! unsupported_format {
    ($($arg:tt)*) => {
        $crate::error::AssetError::UnsupportedFormat(format!($($arg)*))
    };
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_macros() {
        let err = format_error!("bad chunk {} at {:#x}", "MESH", 16);
        assert_eq!(err, AssetError::FormatError("bad chunk MESH at 0x10".to_string()));
        assert!(err.is_invalid());

        let err = unsupported_format!("version {}", 7);
        assert_eq!(err.to_string(), "Unsupported format: version 7");
    }

    #[test]
    fn test_classification() {
        assert!(AssetError::pending("rock.dds", "compiling").is_pending());
        assert!(!AssetError::pending("rock.dds", "compiling").is_invalid());
        assert!(AssetError::invalid("rock.dds", "corrupt").is_invalid());
        assert!(!AssetError::Construction("boom".into()).is_invalid());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AssetError = io.into();
        assert!(matches!(err, AssetError::IoError(_)));
    }
}
