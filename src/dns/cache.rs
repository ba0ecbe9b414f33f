use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::common::ResolveError;

use super::{resolve_all, DnsResolver};

/// 默认缓存时间，DNS 记录变更最多延迟这么久生效
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

type SharedLookup = Shared<BoxFuture<'static, Result<Arc<[IpAddr]>, ResolveError>>>;

struct CacheEntry {
    addrs: Arc<[IpAddr]>,
    /// None 表示 ttl 超出 Instant 的表示范围，条目不过期
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.expires_at.map_or(true, |at| at > Instant::now())
    }
}

#[derive(Default)]
struct InFlight {
    /// 每次 invalidate 加一；旧代的解析结果不写缓存
    generation: u64,
    lookup: Option<SharedLookup>,
}

struct Inner {
    resolver: Option<Arc<dyn DnsResolver>>,
    hosts: Arc<[String]>,
    ttl: Duration,
    entry: RwLock<Option<CacheEntry>>,
    /// 正在进行的解析；并发调用者共享同一个 future
    inflight: Mutex<InFlight>,
}

impl Inner {
    async fn fresh(&self) -> Option<Arc<[IpAddr]>> {
        let entry = self.entry.read().await;
        entry
            .as_ref()
            .filter(|e| e.is_fresh())
            .map(|e| e.addrs.clone())
    }
}

/// 共享的解析 future。只持有 `Weak<Inner>`：缓存被丢弃后，
/// 未完成的解析随最后一个 Shared 句柄一起释放。
async fn refresh(
    inner: Weak<Inner>,
    resolver: Option<Arc<dyn DnsResolver>>,
    hosts: Arc<[String]>,
    generation: u64,
) -> Result<Arc<[IpAddr]>, ResolveError> {
    let result = resolve_all(resolver.as_deref(), &hosts)
        .await
        .map(Arc::<[IpAddr]>::from);

    let Some(inner) = inner.upgrade() else {
        return result;
    };

    // 持 inflight 锁写缓存：拿到锁且看不到 future 的调用者一定能看到新条目
    let mut inflight = inner.inflight.lock().await;
    if inflight.generation != generation {
        debug!(hosts = ?hosts, "host set invalidated during resolution, result dropped");
        return result;
    }
    match &result {
        Ok(addrs) => {
            *inner.entry.write().await = Some(CacheEntry {
                addrs: addrs.clone(),
                expires_at: Instant::now().checked_add(inner.ttl),
            });
            debug!(hosts = ?hosts, count = addrs.len(), "host set cached");
        }
        Err(e) => {
            warn!(host = e.host(), error = %e, "host set resolution failed, not cached");
        }
    }
    inflight.lookup = None;

    result
}

/// 整个主机列表共用一个缓存槽的解析缓存
///
/// 过期或失效后，下一次调用触发一次完整的解析；解析期间到达的调用者
/// 等待并共享这次解析的结果（包括失败）。失败不写缓存。
/// `resolver` 为 None 时每个主机都走系统解析器。
pub struct HostSetCache {
    inner: Arc<Inner>,
}

impl HostSetCache {
    pub fn new(resolver: Option<Arc<dyn DnsResolver>>, hosts: Vec<String>, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                hosts: hosts.into(),
                ttl,
                entry: RwLock::new(None),
                inflight: Mutex::new(InFlight::default()),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// 当前未过期的缓存内容
    pub async fn cached(&self) -> Option<Arc<[IpAddr]>> {
        self.inner.fresh().await
    }

    pub async fn resolve_ips(&self) -> Result<Arc<[IpAddr]>, ResolveError> {
        if let Some(addrs) = self.inner.fresh().await {
            debug!("host set cache hit");
            return Ok(addrs);
        }

        let lookup = {
            let mut inflight = self.inner.inflight.lock().await;
            // 等锁期间可能已有别人完成解析
            if let Some(addrs) = self.inner.fresh().await {
                debug!("host set cache hit after wait");
                return Ok(addrs);
            }
            match inflight.lookup.as_ref() {
                Some(shared) => {
                    debug!("joining in-flight host set resolution");
                    shared.clone()
                }
                None => {
                    let shared = refresh(
                        Arc::downgrade(&self.inner),
                        self.inner.resolver.clone(),
                        self.inner.hosts.clone(),
                        inflight.generation,
                    )
                    .boxed()
                    .shared();
                    inflight.lookup = Some(shared.clone());
                    shared
                }
            }
        };

        lookup.await
    }

    /// 丢弃缓存条目和正在进行的解析，下一次调用重新解析
    ///
    /// 已经在等待旧解析的调用者仍拿到旧结果，但旧结果不会写入缓存。
    pub async fn invalidate(&self) {
        let mut inflight = self.inner.inflight.lock().await;
        inflight.generation += 1;
        inflight.lookup = None;
        *self.inner.entry.write().await = None;
        debug!("host set cache invalidated");
    }
}
