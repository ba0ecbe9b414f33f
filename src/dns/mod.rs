pub mod cache;
pub mod resolver;

use std::net::IpAddr;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use crate::common::ResolveError;

pub use cache::{HostSetCache, DEFAULT_CACHE_TTL};
pub use resolver::{build_resolver, HickoryResolver, StaticResolver, SystemResolver};

/// DNS 解析器 trait
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// 将域名解析为 IP 地址列表。没有记录时返回空列表而不是错误。
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// 解析单个主机；`resolver` 为 None 时使用系统解析器
pub async fn lookup_ip(resolver: Option<&dyn DnsResolver>, host: &str) -> Result<Vec<IpAddr>> {
    match resolver {
        Some(r) => r.resolve(host).await,
        None => SystemResolver.resolve(host).await,
    }
}

/// 逐个解析主机列表并拼接结果（保留重复地址）。任一主机失败则整体失败。
pub async fn resolve_all(
    resolver: Option<&dyn DnsResolver>,
    hosts: &[String],
) -> Result<Vec<IpAddr>, ResolveError> {
    let mut addrs = Vec::new();
    for host in hosts {
        let resolved = lookup_ip(resolver, host)
            .await
            .map_err(|e| ResolveError::new(host.as_str(), e))?;
        debug!(host = host.as_str(), count = resolved.len(), "host resolved");
        addrs.extend(resolved);
    }
    Ok(addrs)
}
