pub mod addr;
pub mod error;

pub use addr::parse_forwarded_addr;
pub use error::{MatchError, MatchErrorKind, ResolveError};
