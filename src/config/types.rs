use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::Result;
use serde::Deserialize;

use crate::common::MatchError;
use crate::router::{validate, MatcherConfig};

use super::directive::parse_directive;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    pub matcher: MatcherSpec,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let matcher = self.matcher.to_config()?;
        validate::validate_hosts(&matcher.hosts)?;
        if matcher.forwarded && http::HeaderName::from_bytes(matcher.header.as_bytes()).is_err() {
            anyhow::bail!("matcher header '{}' is not a valid header name", matcher.header);
        }
        if self.api.listen.parse::<IpAddr>().is_err() {
            anyhow::bail!("api listen '{}' is not an IP address", self.api.listen);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// DNS 后端配置；nameservers 为空时使用系统解析器
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DnsConfig {
    #[serde(default)]
    pub nameservers: Vec<String>,
    /// 固定映射，优先于 nameservers
    #[serde(default, rename = "static")]
    pub static_hosts: HashMap<String, Vec<IpAddr>>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// 匹配器既可以写成指令字符串，也可以写成结构化配置
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MatcherSpec {
    Directive(String),
    Structured(MatcherConfig),
}

impl MatcherSpec {
    pub fn to_config(&self) -> Result<MatcherConfig, MatchError> {
        match self {
            MatcherSpec::Directive(text) => parse_directive(text),
            MatcherSpec::Structured(config) => Ok(config.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9090
}
