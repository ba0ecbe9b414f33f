pub mod directive;
pub mod types;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::OnceLock;

use crate::dns::build_resolver;
use crate::router::RemoteHostMatcher;

pub use directive::parse_directive;
pub use types::Config;

static ENV_VAR_REGEX: OnceLock<Regex> = OnceLock::new();

fn env_var_regex() -> &'static Regex {
    ENV_VAR_REGEX.get_or_init(|| {
        Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}|([A-Za-z_][A-Za-z0-9_]*))")
            .expect("env var pattern is valid")
    })
}

/// 展开 `$VAR`、`${VAR}` 与 `${VAR:-default}`
///
/// 未定义的变量替换为空串；`:-` 的默认值在变量未定义或为空时生效。
/// 不构成变量引用的 `$` 原样保留。
pub fn expand_env_vars(input: &str) -> String {
    env_var_regex()
        .replace_all(input, |caps: &Captures| {
            let name = caps.get(1).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            match (std::env::var(name), caps.get(2)) {
                (Ok(val), _) if !val.is_empty() => val,
                (_, Some(default)) => default.as_str().to_string(),
                (Ok(val), None) => val,
                (Err(_), None) => String::new(),
            }
        })
        .into_owned()
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = serde_yml::from_str(&expand_env_vars(content))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &str) -> Result<Config> {
    let content = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read config '{}'", path))?;
    parse_config(&content)
}

/// 按配置构建解析器并 provision + validate 匹配器
pub fn build_matcher(config: &Config) -> Result<RemoteHostMatcher> {
    let resolver = build_resolver(&config.dns)?;
    let matcher_config = config.matcher.to_config()?;
    Ok(RemoteHostMatcher::new(matcher_config, Some(resolver))?)
}
