use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, info_span, Instrument, Span};

use crate::common::{parse_forwarded_addr, MatchError, ResolveError};
use crate::dns::{resolve_all, DnsResolver, HostSetCache};

use super::request::RemoteRequest;
use super::validate;

pub const DEFAULT_FORWARDED_HEADER: &str = "X-Forwarded-For";

/// remote_host 匹配器配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MatcherConfig {
    pub hosts: Vec<String>,
    /// 使用转发头中的地址而不是连接的对端地址
    #[serde(default)]
    pub forwarded: bool,
    /// 不缓存解析结果，每次匹配都重新解析
    #[serde(default)]
    pub nocache: bool,
    #[serde(default = "default_header")]
    pub header: String,
    /// 缓存时间（秒）
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
}

fn default_header() -> String {
    DEFAULT_FORWARDED_HEADER.to_string()
}

fn default_cache_ttl() -> u64 {
    crate::dns::DEFAULT_CACHE_TTL.as_secs()
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            forwarded: false,
            nocache: false,
            header: default_header(),
            cache_ttl: default_cache_ttl(),
        }
    }
}

impl MatcherConfig {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// 挂接解析器与缓存，得到可用的匹配器（尚未校验主机名）
    ///
    /// `resolver` 为 None 时使用系统解析器。
    pub fn provision(self, resolver: Option<Arc<dyn DnsResolver>>) -> RemoteHostMatcher {
        // 首次 provision 时编译主机名正则
        validate::host_name_regex();

        let custom_resolver = resolver.is_some();
        let cache = HostSetCache::new(
            resolver.clone(),
            self.hosts.clone(),
            Duration::from_secs(self.cache_ttl),
        );
        let span = info_span!(
            "remote_host",
            hosts = ?self.hosts,
            forwarded = self.forwarded,
            nocache = self.nocache
        );
        span.in_scope(|| {
            info!(custom_resolver, ttl_secs = self.cache_ttl, "remote_host matcher provisioned");
        });

        RemoteHostMatcher {
            config: self,
            resolver,
            cache,
            span,
        }
    }
}

/// 按主机名解析结果匹配请求来源地址
pub struct RemoteHostMatcher {
    config: MatcherConfig,
    /// None 时由 `dns::lookup_ip` 回落到系统解析器
    resolver: Option<Arc<dyn DnsResolver>>,
    cache: HostSetCache,
    span: Span,
}

impl RemoteHostMatcher {
    /// provision + validate
    pub fn new(
        config: MatcherConfig,
        resolver: Option<Arc<dyn DnsResolver>>,
    ) -> Result<Self, MatchError> {
        let matcher = config.provision(resolver);
        matcher.validate()?;
        Ok(matcher)
    }

    /// 校验所有主机名语法；无副作用，可重复调用
    pub fn validate(&self) -> Result<(), MatchError> {
        validate::validate_hosts(&self.config.hosts)
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    pub fn hosts(&self) -> &[String] {
        &self.config.hosts
    }

    /// 当前地址集合：默认走缓存，nocache 时直接解析
    pub async fn resolve_ips(&self) -> Result<Arc<[IpAddr]>, ResolveError> {
        if self.config.nocache {
            let addrs = resolve_all(self.resolver.as_deref(), &self.config.hosts).await?;
            Ok(addrs.into())
        } else {
            self.cache.resolve_ips().await
        }
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate().await;
    }

    /// 请求的候选地址：forwarded 时取转发头，否则取对端地址
    pub fn candidate_addr<R: RemoteRequest + ?Sized>(&self, req: &R) -> Result<IpAddr, MatchError> {
        if self.config.forwarded {
            let header = self.config.header.as_str();
            let value = req
                .header(header)
                .ok_or_else(|| MatchError::header(header, "missing"))?;
            parse_forwarded_addr(header, value)
        } else {
            req.remote_addr()
                .map(|addr| addr.ip())
                .ok_or(MatchError::NoRemoteAddr)
        }
    }

    /// 候选地址在解析结果中时返回 true。解析失败返回错误而不是 false。
    ///
    /// 候选地址在返回 future 之前就已取出，future 不借用 `req`。
    pub fn matches<R: RemoteRequest + ?Sized>(
        &self,
        req: &R,
    ) -> impl Future<Output = Result<bool, MatchError>> + Send + '_ {
        let candidate = self.candidate_addr(req);
        async move { self.matches_addr(candidate?).await }
    }

    pub async fn matches_addr(&self, candidate: IpAddr) -> Result<bool, MatchError> {
        async {
            let addrs = self.resolve_ips().await?;
            let matched = contains_addr(&addrs, candidate);
            debug!(candidate = %candidate, resolved = addrs.len(), matched, "remote_host evaluated");
            Ok::<_, MatchError>(matched)
        }
        .instrument(self.span.clone())
        .await
    }
}

/// IPv4 与 IPv4-mapped IPv6 视为同一地址
pub fn contains_addr(addrs: &[IpAddr], candidate: IpAddr) -> bool {
    let candidate = candidate.to_canonical();
    addrs.iter().any(|a| a.to_canonical() == candidate)
}
