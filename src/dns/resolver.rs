use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::config::{
    NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts,
};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::op::ResponseCode;
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info};

use crate::common::addr::parse_ip_strip_port;
use crate::config::types::DnsConfig;

use super::DnsResolver;

/// 系统 DNS 解析器（使用 tokio::net::lookup_host）
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host(format!("{}:0", host))
            .await?
            .map(|a| a.ip())
            .collect();
        debug!(host = host, count = addrs.len(), "system DNS resolved");
        Ok(addrs)
    }
}

/// 基于 hickory-resolver 的 DNS 解析器
pub struct HickoryResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryResolver {
    pub fn new(addresses: &[String], timeout: Option<Duration>) -> Result<Self> {
        let (config, mut opts) = parse_dns_addresses(addresses)?;
        if let Some(timeout) = timeout {
            opts.timeout = timeout;
        }
        let resolver = TokioAsyncResolver::tokio(config, opts);
        info!(servers = ?addresses, "Hickory DNS resolver created");
        Ok(Self { resolver })
    }
}

#[async_trait]
impl DnsResolver for HickoryResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        match self.resolver.lookup_ip(host).await {
            Ok(response) => {
                let addrs: Vec<IpAddr> = response.iter().collect();
                debug!(host = host, count = addrs.len(), "hickory DNS resolved");
                Ok(addrs)
            }
            // NOERROR 但没有 A/AAAA 记录：视为空结果
            Err(e)
                if matches!(
                    e.kind(),
                    ResolveErrorKind::NoRecordsFound { response_code, .. }
                        if *response_code == ResponseCode::NoError
                ) =>
            {
                debug!(host = host, "hickory DNS: no records");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// 解析 DNS 服务器地址列表，返回 ResolverConfig
fn parse_dns_addresses(addresses: &[String]) -> Result<(ResolverConfig, ResolverOpts)> {
    let mut opts = ResolverOpts::default();
    opts.use_hosts_file = false;

    let mut group = NameServerConfigGroup::new();
    for address in addresses {
        if let Some(tls_addr) = address.strip_prefix("tls://") {
            // DNS over TLS
            let (ip, port) = parse_ip_port(tls_addr, 853)?;
            group.push(NameServerConfig {
                socket_addr: std::net::SocketAddr::new(ip, port),
                protocol: Protocol::Tls,
                tls_dns_name: Some(ip.to_string()),
                trust_negative_responses: true,
                tls_config: None,
                bind_addr: None,
            });
        } else {
            // UDP DNS
            let (ip, port) = parse_ip_port(address, 53)?;
            group.merge(NameServerConfigGroup::from_ips_clear(&[ip], port, true));
        }
    }
    if group.is_empty() {
        anyhow::bail!("no DNS servers given");
    }

    let config = ResolverConfig::from_parts(None, vec![], group);
    Ok((config, opts))
}

fn parse_ip_port(s: &str, default_port: u16) -> Result<(IpAddr, u16)> {
    if let Ok(addr) = s.parse::<std::net::SocketAddr>() {
        return Ok((addr.ip(), addr.port()));
    }
    match parse_ip_strip_port(s) {
        Some(ip) => Ok((ip, default_port)),
        None => anyhow::bail!("invalid DNS address: {}", s),
    }
}

/// 静态映射解析器：结果完全由构造时给定的表决定
///
/// 未登记的主机交给 fallback；没有 fallback 时报错。
pub struct StaticResolver {
    hosts: HashMap<String, std::result::Result<Vec<IpAddr>, String>>,
    fallback: Option<Arc<dyn DnsResolver>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            hosts: HashMap::new(),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_host(mut self, host: &str, addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        self.hosts
            .insert(host.to_lowercase(), Ok(addrs.into_iter().collect()));
        self
    }

    /// 该主机的解析总是失败，错误信息为 `message`
    pub fn with_failure(mut self, host: &str, message: &str) -> Self {
        self.hosts
            .insert(host.to_lowercase(), Err(message.to_string()));
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn DnsResolver>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// 每次查询前等待，模拟网络耗时
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 已处理的查询次数（含失败）
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.hosts.get(&host.to_lowercase()) {
            Some(Ok(addrs)) => {
                debug!(host = host, count = addrs.len(), "static mapping hit");
                Ok(addrs.clone())
            }
            Some(Err(message)) => Err(anyhow::anyhow!("{}", message)),
            None => match &self.fallback {
                Some(fallback) => fallback.resolve(host).await,
                None => anyhow::bail!("no suitable address found"),
            },
        }
    }
}

/// 根据配置构建 DNS 解析器
pub fn build_resolver(config: &DnsConfig) -> Result<Arc<dyn DnsResolver>> {
    let inner: Arc<dyn DnsResolver> = if config.nameservers.is_empty() {
        info!("no DNS servers configured, using system resolver");
        Arc::new(SystemResolver)
    } else {
        let timeout = config.timeout_ms.map(Duration::from_millis);
        Arc::new(HickoryResolver::new(&config.nameservers, timeout)?)
    };

    if config.static_hosts.is_empty() {
        return Ok(inner);
    }

    let mut resolver = StaticResolver::new().with_fallback(inner);
    for (host, addrs) in &config.static_hosts {
        resolver = resolver.with_host(host, addrs.iter().copied());
    }
    info!(count = config.static_hosts.len(), "static DNS mappings loaded");
    Ok(Arc::new(resolver))
}
