#![allow(clippy::new_without_default, clippy::type_complexity)]

pub mod api;
pub mod common;
pub mod config;
pub mod dns;
pub mod router;

pub use common::{MatchError, MatchErrorKind, ResolveError};
pub use dns::{DnsResolver, HostSetCache};
pub use router::{MatcherConfig, RemoteHostMatcher, RemoteRequest, RequestMeta};
