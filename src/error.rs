// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Closed error taxonomy shared by every component.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the crate can report.
///
/// Load-time failures are cached by the loader and handed out again on every
/// later call, so the type is `Clone` and carries only owned text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("unsupported platform: os={os} arch={arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("no native artifact for platform {platform} ({variant})")]
    UnresolvedArtifact { platform: String, variant: String },

    #[error("failed to load native library {artifact}: {reason}")]
    NativeLoad { artifact: String, reason: String },

    #[error("invalid input{}: {reason}", fmt_offset(.offset))]
    InvalidInput {
        offset: Option<usize>,
        reason: String,
    },

    #[error("image {width}x{height} exceeds limit: {limit}")]
    ResourceLimitExceeded {
        width: u64,
        height: u64,
        limit: String,
    },

    #[error("{format} decode failed: {message}")]
    DecodeFailure { format: String, message: String },

    #[error("buffer handle {handle} was already retrieved")]
    DoubleRetrieve { handle: u64 },

    #[error("buffer protocol violation: {detail}")]
    Protocol { detail: String },
}

fn fmt_offset(offset: &Option<usize>) -> String {
    match offset {
        Some(offset) => format!(" at byte {offset}"),
        None => String::new(),
    }
}

/// Discriminant of [`Error`] without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnsupportedPlatform,
    UnresolvedArtifact,
    NativeLoad,
    InvalidInput,
    ResourceLimitExceeded,
    DecodeFailure,
    DoubleRetrieve,
    Protocol,
}

impl ErrorKind {
    /// Fatal kinds are not caused by the input of a single call and will not
    /// go away by retrying with different data.
    pub fn is_fatal(self) -> bool {
        !matches!(
            self,
            ErrorKind::InvalidInput | ErrorKind::ResourceLimitExceeded | ErrorKind::DecodeFailure
        )
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedPlatform { .. } => ErrorKind::UnsupportedPlatform,
            Error::UnresolvedArtifact { .. } => ErrorKind::UnresolvedArtifact,
            Error::NativeLoad { .. } => ErrorKind::NativeLoad,
            Error::InvalidInput { .. } => ErrorKind::InvalidInput,
            Error::ResourceLimitExceeded { .. } => ErrorKind::ResourceLimitExceeded,
            Error::DecodeFailure { .. } => ErrorKind::DecodeFailure,
            Error::DoubleRetrieve { .. } => ErrorKind::DoubleRetrieve,
            Error::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    pub(crate) fn invalid_input(offset: Option<usize>, reason: impl Into<String>) -> Self {
        Error::InvalidInput {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn native_load(artifact: impl Into<String>, reason: impl ToString) -> Self {
        Error::NativeLoad {
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn protocol(detail: impl Into<String>) -> Self {
        Error::Protocol {
            detail: detail.into(),
        }
    }
}
