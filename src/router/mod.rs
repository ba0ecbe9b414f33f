pub mod remote_host;
pub mod request;
pub mod validate;

pub use remote_host::{contains_addr, MatcherConfig, RemoteHostMatcher, DEFAULT_FORWARDED_HEADER};
pub use request::{RemoteRequest, RequestMeta};
