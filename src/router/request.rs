use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use http::HeaderMap;

/// 匹配器需要从请求中读取的信息
pub trait RemoteRequest {
    /// 传输层对端地址
    fn remote_addr(&self) -> Option<SocketAddr>;

    /// 读取指定请求头（非 ASCII 值视为不存在）
    fn header(&self, name: &str) -> Option<&str>;
}

/// 不依赖具体 HTTP 类型的请求描述
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub remote: Option<SocketAddr>,
    pub headers: HeaderMap,
}

impl RequestMeta {
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            remote: Some(remote),
            headers: HeaderMap::new(),
        }
    }

    /// 追加一个请求头；名称或值不合法时忽略
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }
}

impl RemoteRequest for RequestMeta {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// 对端地址取自 axum 的 `ConnectInfo<SocketAddr>` 扩展
impl<B> RemoteRequest for http::Request<B> {
    fn remote_addr(&self) -> Option<SocketAddr> {
        self.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }
}
