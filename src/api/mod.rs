use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::common::MatchError;
use crate::config::types::ApiConfig;
use crate::router::RemoteHostMatcher;

/// 拒绝不匹配的请求
///
/// - 不匹配：403
/// - 转发头缺失或无法解析：400
/// - DNS 解析失败：502
/// - 拿不到对端地址（未使用 `into_make_service_with_connect_info`）：500
pub async fn remote_host_guard(
    State(matcher): State<Arc<RemoteHostMatcher>>,
    req: Request,
    next: Next,
) -> Response {
    let candidate = matcher.candidate_addr(&req);
    let result = match candidate {
        Ok(addr) => matcher.matches_addr(addr).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(true) => next.run(req).await,
        Ok(false) => StatusCode::FORBIDDEN.into_response(),
        Err(e) => {
            warn!(error = %e, kind = e.kind().as_str(), "remote_host evaluation failed");
            let status = match e {
                MatchError::HeaderParse { .. } => StatusCode::BAD_REQUEST,
                MatchError::Resolution(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string()).into_response()
        }
    }
}

/// 返回匹配器判定所用的地址
async fn whoami(
    State(matcher): State<Arc<RemoteHostMatcher>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request,
) -> String {
    match matcher.candidate_addr(&req) {
        Ok(addr) => addr.to_string(),
        Err(_) => remote.ip().to_string(),
    }
}

/// 受 remote_host 保护的路由
pub fn router(matcher: Arc<RemoteHostMatcher>) -> axum::Router {
    axum::Router::new()
        .route("/", get(whoami))
        .layer(middleware::from_fn_with_state(
            matcher.clone(),
            remote_host_guard,
        ))
        .with_state(matcher)
}

/// 启动 HTTP 服务器
pub fn start(config: &ApiConfig, matcher: Arc<RemoteHostMatcher>) -> Result<JoinHandle<()>> {
    let app = router(matcher);
    let bind_addr = format!("{}:{}", config.listen, config.port);
    info!(addr = bind_addr, "API server starting");

    let handle = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(addr = bind_addr, error = %e, "API server bind failed");
                return;
            }
        };
        info!(addr = bind_addr, "API server listening");
        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        {
            tracing::error!(error = %e, "API server error");
        }
    });

    Ok(handle)
}
