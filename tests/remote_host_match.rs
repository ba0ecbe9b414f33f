//! remote_host 匹配器集成测试

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use remote_host::dns::{DnsResolver, StaticResolver};
use remote_host::{MatchError, MatchErrorKind, MatcherConfig, RemoteHostMatcher, RequestMeta};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn from(addr: &str) -> RequestMeta {
    RequestMeta::new(SocketAddr::new(ip(addr), 51000))
}

fn example_resolver() -> Arc<StaticResolver> {
    Arc::new(
        StaticResolver::new()
            .with_host("example.com", vec![ip("127.0.0.1"), ip("127.0.0.2")])
            .with_host("example.org", vec![ip("::1"), ip("fe80::1")])
            .with_host("no.records.example", vec![])
            .with_failure("nonexistent.invalid", "no such host"),
    )
}

/// 计数并可控制结果的解析器，模拟记录变化
struct SwitchingResolver {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl DnsResolver for SwitchingResolver {
    async fn resolve(&self, _host: &str) -> Result<Vec<IpAddr>> {
        let n = self.count.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Ok(vec!["10.0.0.1".parse().unwrap()])
        } else {
            Ok(vec!["10.0.0.2".parse().unwrap()])
        }
    }
}

#[tokio::test]
async fn remote_addr_in_resolved_set() {
    let matcher =
        RemoteHostMatcher::new(MatcherConfig::new(["example.com"]), Some(example_resolver()))
            .unwrap();

    assert!(matcher.matches(&from("127.0.0.2")).await.unwrap());
    assert!(!matcher.matches(&from("127.0.0.3")).await.unwrap());
}

#[tokio::test]
async fn multiple_hosts_union() {
    let resolver = example_resolver();
    let matcher = RemoteHostMatcher::new(
        MatcherConfig::new(["example.com", "example.org", "no.records.example"]),
        Some(resolver.clone()),
    )
    .unwrap();

    let mut addrs = matcher.resolve_ips().await.unwrap().to_vec();
    addrs.sort();
    let mut want = vec![ip("127.0.0.1"), ip("127.0.0.2"), ip("::1"), ip("fe80::1")];
    want.sort();
    assert_eq!(addrs, want);

    assert!(matcher.matches(&from("fe80::1")).await.unwrap());
    assert!(matcher.matches(&from("127.0.0.1")).await.unwrap());
    // 三个主机各解析一次
    assert_eq!(resolver.calls(), 3);
}

#[tokio::test]
async fn ipv4_mapped_candidate_matches() {
    let matcher =
        RemoteHostMatcher::new(MatcherConfig::new(["example.com"]), Some(example_resolver()))
            .unwrap();
    assert!(matcher.matches(&from("::ffff:127.0.0.1")).await.unwrap());
}

#[tokio::test]
async fn empty_resolved_set_never_matches() {
    let matcher = RemoteHostMatcher::new(
        MatcherConfig::new(["no.records.example"]),
        Some(example_resolver()),
    )
    .unwrap();

    assert!(matcher.resolve_ips().await.unwrap().is_empty());
    assert!(!matcher.matches(&from("127.0.0.1")).await.unwrap());
    assert!(!matcher.matches(&from("::1")).await.unwrap());
}

#[tokio::test]
async fn resolution_failure_is_propagated() {
    let resolver = example_resolver();
    let matcher = RemoteHostMatcher::new(
        MatcherConfig::new(["example.com", "nonexistent.invalid"]),
        Some(resolver.clone()),
    )
    .unwrap();

    let err = matcher.matches(&from("127.0.0.1")).await.unwrap_err();
    assert_eq!(err.kind(), MatchErrorKind::Resolution);
    assert_eq!(err.to_string(), "no such host");
    match err {
        MatchError::Resolution(e) => {
            assert_eq!(e.host(), "nonexistent.invalid");
            assert_eq!(e.inner().to_string(), "no such host");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // 没有缓存部分结果，下一次重新解析全部主机
    assert!(matcher.matches(&from("127.0.0.1")).await.is_err());
    assert_eq!(resolver.calls(), 4);
}

#[tokio::test]
async fn forwarded_header_absent_is_error() {
    let config = MatcherConfig {
        forwarded: true,
        ..MatcherConfig::new(["example.com"])
    };
    let matcher = RemoteHostMatcher::new(config, Some(example_resolver())).unwrap();

    let err = matcher.matches(&from("127.0.0.1")).await.unwrap_err();
    assert_eq!(err.kind(), MatchErrorKind::HeaderParse);
}

#[tokio::test]
async fn forwarded_header_malformed_is_error() {
    let config = MatcherConfig {
        forwarded: true,
        ..MatcherConfig::new(["example.com"])
    };
    let matcher = RemoteHostMatcher::new(config, Some(example_resolver())).unwrap();

    let req = from("127.0.0.1").with_header("X-Forwarded-For", "not-an-address");
    let err = matcher.matches(&req).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid 'X-Forwarded-For' header: 'not-an-address' is not an IP address"
    );
}

#[tokio::test]
async fn forwarded_custom_header() {
    let config = MatcherConfig {
        forwarded: true,
        header: "Forwarded".to_string(),
        ..MatcherConfig::new(["example.org"])
    };
    let matcher = RemoteHostMatcher::new(config, Some(example_resolver())).unwrap();

    let req = from("192.0.2.1").with_header("Forwarded", r#"for="[::1]:8443";proto=https"#);
    assert!(matcher.matches(&req).await.unwrap());
}

#[tokio::test]
async fn cached_within_ttl() {
    let count = Arc::new(AtomicUsize::new(0));
    let matcher = RemoteHostMatcher::new(
        MatcherConfig::new(["switching.example"]),
        Some(Arc::new(SwitchingResolver {
            count: count.clone(),
        })),
    )
    .unwrap();

    for _ in 0..10 {
        assert!(matcher.matches(&from("10.0.0.1")).await.unwrap());
    }
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn ttl_expiry_picks_up_new_records() {
    let count = Arc::new(AtomicUsize::new(0));
    let config = MatcherConfig {
        cache_ttl: 1,
        ..MatcherConfig::new(["switching.example"])
    };
    let matcher = RemoteHostMatcher::new(
        config,
        Some(Arc::new(SwitchingResolver {
            count: count.clone(),
        })),
    )
    .unwrap();

    assert!(matcher.matches(&from("10.0.0.1")).await.unwrap());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!matcher.matches(&from("10.0.0.1")).await.unwrap());
    assert!(matcher.matches(&from("10.0.0.2")).await.unwrap());
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn nocache_sees_changes_immediately() {
    let count = Arc::new(AtomicUsize::new(0));
    let config = MatcherConfig {
        nocache: true,
        ..MatcherConfig::new(["switching.example"])
    };
    let matcher = RemoteHostMatcher::new(
        config,
        Some(Arc::new(SwitchingResolver {
            count: count.clone(),
        })),
    )
    .unwrap();

    assert!(matcher.matches(&from("10.0.0.1")).await.unwrap());
    assert!(matcher.matches(&from("10.0.0.2")).await.unwrap());
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_matches_share_one_resolution() {
    let resolver = Arc::new(
        StaticResolver::new()
            .with_host("example.com", vec![ip("127.0.0.1")])
            .with_host("example.org", vec![ip("::1")])
            .with_delay(Duration::from_millis(100)),
    );
    let matcher = Arc::new(
        RemoteHostMatcher::new(
            MatcherConfig::new(["example.com", "example.org"]),
            Some(resolver.clone()),
        )
        .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..200 {
        let matcher = matcher.clone();
        handles.push(tokio::spawn(async move {
            let addr = if i % 2 == 0 { "127.0.0.1" } else { "192.0.2.1" };
            (i, matcher.matches(&from(addr)).await)
        }));
    }

    for handle in handles {
        let (i, result) = handle.await.unwrap();
        assert_eq!(result.unwrap(), i % 2 == 0);
    }
    // 一次解析 = 每个主机各一次查询
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test]
async fn separate_instances_do_not_share_cache() {
    let resolver = example_resolver();
    let a = RemoteHostMatcher::new(MatcherConfig::new(["example.com"]), Some(resolver.clone()))
        .unwrap();
    let b = RemoteHostMatcher::new(MatcherConfig::new(["example.com"]), Some(resolver.clone()))
        .unwrap();

    a.matches(&from("127.0.0.1")).await.unwrap();
    b.matches(&from("127.0.0.1")).await.unwrap();
    assert_eq!(resolver.calls(), 2);
}

#[test]
fn invalid_hosts_fail_provisioning() {
    for host in [
        ".",
        "example..com",
        ".example.org",
        "-example.org",
        "example-.org",
        "_http.example",
        "ëxample.com",
        "*.example.com",
    ] {
        let err = RemoteHostMatcher::new(MatcherConfig::new([host]), None)
            .err()
            .unwrap();
        assert_eq!(err.to_string(), format!("'{}' is not a valid host name", host));
    }
}

#[test]
fn valid_hosts_pass_validation() {
    for hosts in [
        vec!["example"],
        vec!["example.com"],
        vec!["example.com", "example.org"],
        vec!["sub.example.com"],
        vec!["ex-am-ple.com"],
        vec!["example24.com"],
        vec!["42example.org"],
        vec!["42.example"],
    ] {
        let matcher = MatcherConfig::new(hosts).provision(None);
        assert!(matcher.validate().is_ok());
    }
}

#[tokio::test]
async fn cancelled_match_releases_resolver_on_drop() {
    let resolver = Arc::new(
        StaticResolver::new()
            .with_host("example.com", vec![ip("127.0.0.1")])
            .with_delay(Duration::from_millis(200)),
    );
    let matcher =
        RemoteHostMatcher::new(MatcherConfig::new(["example.com"]), Some(resolver.clone()))
            .unwrap();

    let req = from("127.0.0.1");
    let timed_out = tokio::time::timeout(Duration::from_millis(20), matcher.matches(&req)).await;
    assert!(timed_out.is_err());

    drop(matcher);
    assert_eq!(Arc::strong_count(&resolver), 1);
}

#[tokio::test]
async fn invalidate_during_resolution_refetches() {
    let count = Arc::new(AtomicUsize::new(0));
    let matcher = Arc::new(
        RemoteHostMatcher::new(
            MatcherConfig::new(["switching.example"]),
            Some(Arc::new(SlowSwitchingResolver {
                count: count.clone(),
            })),
        )
        .unwrap(),
    );

    let pending = {
        let matcher = matcher.clone();
        tokio::spawn(async move { matcher.matches(&from("10.0.0.1")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    matcher.invalidate().await;

    // 失效前发起的匹配看到旧记录，之后的匹配看到新记录
    assert!(pending.await.unwrap().unwrap());
    assert!(matcher.matches(&from("10.0.0.2")).await.unwrap());
    assert!(!matcher.matches(&from("10.0.0.1")).await.unwrap());
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

/// 带延迟的 SwitchingResolver
struct SlowSwitchingResolver {
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl DnsResolver for SlowSwitchingResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        SwitchingResolver {
            count: self.count.clone(),
        }
        .resolve(host)
        .await
    }
}
