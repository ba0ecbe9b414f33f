use std::sync::OnceLock;

use regex::Regex;

use crate::common::MatchError;

/// 主机名语法：以单个点分隔的标签，标签由字母、数字、连字符组成且不以连字符开头或结尾
const HOST_NAME_PATTERN: &str =
    r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*$";

static HOST_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

/// 进程级共享的已编译正则，首次调用时编译
pub fn host_name_regex() -> &'static Regex {
    HOST_NAME_REGEX.get_or_init(|| Regex::new(HOST_NAME_PATTERN).expect("host name pattern is valid"))
}

/// 正则是否已经编译过
pub fn is_compiled() -> bool {
    HOST_NAME_REGEX.get().is_some()
}

pub fn is_valid_host_name(host: &str) -> bool {
    host_name_regex().is_match(host)
}

/// 校验主机列表，返回第一个不合法的主机
pub fn validate_hosts(hosts: &[String]) -> Result<(), MatchError> {
    match hosts.iter().find(|h| !is_valid_host_name(h)) {
        Some(bad) => Err(MatchError::InvalidHostName(bad.clone())),
        None => Ok(()),
    }
}
