use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// 单个主机解析失败。Display 与 source 都直接沿用后端返回的原始错误，
/// 主机名只作为字段携带。
///
/// 可 Clone：同一次 single-flight 解析的所有等待者拿到的是同一个错误。
#[derive(Debug, Clone)]
pub struct ResolveError {
    host: String,
    source: Arc<dyn StdError + Send + Sync>,
}

impl ResolveError {
    pub fn new(host: impl Into<String>, source: anyhow::Error) -> Self {
        let source: Box<dyn StdError + Send + Sync> = source.into();
        Self {
            host: host.into(),
            source: Arc::from(source),
        }
    }

    /// 解析失败的主机名
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 后端返回的原始错误
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

impl StdError for ResolveError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.source()
    }
}

#[derive(Error, Debug, Clone)]
pub enum MatchError {
    #[error("'{0}' is not a valid host name")]
    InvalidHostName(String),

    #[error("{reason}, at line {line}")]
    MalformedDirective { line: usize, reason: String },

    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error("invalid '{header}' header: {reason}")]
    HeaderParse { header: String, reason: String },

    #[error("request has no remote address")]
    NoRemoteAddr,
}

impl MatchError {
    pub(crate) fn header(header: &str, reason: impl Into<String>) -> Self {
        MatchError::HeaderParse {
            header: header.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn directive(line: usize, reason: impl Into<String>) -> Self {
        MatchError::MalformedDirective {
            line,
            reason: reason.into(),
        }
    }

    /// Whether this error is fatal to provisioning (the configuration must be fixed).
    pub fn is_config_error(&self) -> bool {
        self.kind().is_config()
    }

    /// Get the kind/category of this error.
    pub fn kind(&self) -> MatchErrorKind {
        match self {
            MatchError::InvalidHostName(_) => MatchErrorKind::InvalidHostName,
            MatchError::MalformedDirective { .. } => MatchErrorKind::MalformedDirective,
            MatchError::Resolution(_) => MatchErrorKind::Resolution,
            MatchError::HeaderParse { .. } => MatchErrorKind::HeaderParse,
            MatchError::NoRemoteAddr => MatchErrorKind::NoRemoteAddr,
        }
    }
}

/// Lightweight error category for pattern matching without borrowing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchErrorKind {
    InvalidHostName,
    MalformedDirective,
    Resolution,
    HeaderParse,
    NoRemoteAddr,
}

impl MatchErrorKind {
    pub fn is_config(self) -> bool {
        matches!(
            self,
            MatchErrorKind::InvalidHostName | MatchErrorKind::MalformedDirective
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchErrorKind::InvalidHostName => "INVALID_HOST",
            MatchErrorKind::MalformedDirective => "MALFORMED_DIRECTIVE",
            MatchErrorKind::Resolution => "DNS_FAILED",
            MatchErrorKind::HeaderParse => "BAD_HEADER",
            MatchErrorKind::NoRemoteAddr => "NO_REMOTE_ADDR",
        }
    }
}
