//! `remote_host [forwarded] [nocache] host1 [host2 ...]` 指令解析

use crate::common::MatchError;
use crate::router::MatcherConfig;

pub const DIRECTIVE_NAME: &str = "remote_host";

/// 按空白切分，记录每个 token 所在行（从 1 开始）
fn tokenize(input: &str) -> Vec<(&str, usize)> {
    input
        .lines()
        .enumerate()
        .flat_map(|(idx, line)| {
            let line = line.split('#').next().unwrap_or_default();
            line.split_whitespace().map(move |tok| (tok, idx + 1))
        })
        .collect()
}

pub fn parse_directive(input: &str) -> Result<MatcherConfig, MatchError> {
    let mut tokens = tokenize(input).into_iter().peekable();

    let (name, mut line) = tokens.next().ok_or_else(|| {
        MatchError::directive(1, "expected 'remote_host' directive, found end of input")
    })?;
    if name != DIRECTIVE_NAME {
        return Err(MatchError::directive(
            line,
            format!("expected '{}' directive, found '{}'", DIRECTIVE_NAME, name),
        ));
    }

    let mut config = MatcherConfig::default();
    while let Some((tok, tok_line)) = tokens.next() {
        line = tok_line;
        match tok {
            "{" => {
                // 报告块内第一个 token 的位置
                let inner = tokens.peek().map(|(_, l)| *l).unwrap_or(tok_line);
                return Err(MatchError::directive(
                    inner,
                    "malformed remote_host matcher: blocks are not supported",
                ));
            }
            "forwarded" | "nocache" => {
                if !config.hosts.is_empty() {
                    return Err(MatchError::directive(
                        tok_line,
                        format!("if used, '{}' must appear before 'hosts' argument", tok),
                    ));
                }
                if tok == "forwarded" {
                    config.forwarded = true;
                } else {
                    config.nocache = true;
                }
            }
            host => config.hosts.push(host.to_string()),
        }
    }

    if config.hosts.is_empty() {
        return Err(MatchError::directive(
            line,
            "remote_host requires at least one host",
        ));
    }
    Ok(config)
}
