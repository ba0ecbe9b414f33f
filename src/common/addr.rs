use std::net::{IpAddr, SocketAddr};

use super::error::MatchError;

/// 从转发头的值中取出客户端地址（去掉端口）
///
/// - `Forwarded`（RFC 7239）：取第一个元素的 `for=` 参数
/// - 其他头（`X-Forwarded-For`、`X-Real-IP` 等）：取逗号分隔的第一项
pub fn parse_forwarded_addr(header: &str, value: &str) -> Result<IpAddr, MatchError> {
    let first = value.split(',').next().unwrap_or_default().trim();
    if first.is_empty() {
        return Err(MatchError::header(header, "empty value"));
    }

    let node = if header.eq_ignore_ascii_case("forwarded") {
        forwarded_for_param(first)
            .ok_or_else(|| MatchError::header(header, "no 'for' parameter"))?
    } else {
        first
    };

    parse_ip_strip_port(node)
        .ok_or_else(|| MatchError::header(header, format!("'{}' is not an IP address", node)))
}

/// 取 `for=...` 参数值，去掉引号
fn forwarded_for_param(element: &str) -> Option<&str> {
    element.split(';').find_map(|pair| {
        let (key, val) = pair.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("for") {
            Some(val.trim().trim_matches('"'))
        } else {
            None
        }
    })
}

/// 解析 "ip" 或 "ip:port" 或 "[ipv6]" 或 "[ipv6]:port" 格式，只保留 IP
pub fn parse_ip_strip_port(s: &str) -> Option<IpAddr> {
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some(ip);
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    // [ipv6] 无端口
    let stripped = s.strip_prefix('[')?.strip_suffix(']')?;
    stripped.parse::<IpAddr>().ok()
}
