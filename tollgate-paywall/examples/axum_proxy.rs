use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tollgate_core::{
    agent::{PaymentAgent, SeizeOutcome, SeizeRequest, TopUpOutcome, TopUpRequest},
    config::GateConfig,
    token::TokenCipher,
    types::WalletKey,
};
use tollgate_paywall::gate::{AccessGrant, Gate};
use tower_http::trace::TraceLayer;

/// Payment agent that approves everything, standing in for a real payment rail.
#[derive(Debug, Default)]
struct ApprovingAgent {
    references: AtomicU64,
}

impl PaymentAgent for ApprovingAgent {
    type Error = std::convert::Infallible;

    async fn top_up(&self, request: TopUpRequest) -> Result<TopUpOutcome, Self::Error> {
        let reference = self.references.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Topping up: user='{}', wallet='{}', amount={}",
            request.user_id,
            request.wallet,
            request.amount
        );
        Ok(TopUpOutcome::success(format!("tx-{reference}")))
    }

    async fn seize(&self, request: SeizeRequest) -> Result<SeizeOutcome, Self::Error> {
        tracing::info!(
            "Seizing balance: user='{}', wallet='{}'",
            request.user_id,
            request.wallet
        );
        Ok(SeizeOutcome::success(None))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cipher = match std::env::var("SESSION_KEY") {
        Ok(_) => TokenCipher::from_env().expect("SESSION_KEY must be 64 hex characters"),
        Err(_) => {
            tracing::warn!("SESSION_KEY not set; using a throwaway key");
            TokenCipher::generate()
        }
    };
    let config = GateConfig::from_env().expect("Invalid gate configuration");
    tracing::info!("Using gate configuration {:?}", config);

    let gate = Gate::builder()
        .agent(ApprovingAgent::default())
        .cipher(cipher)
        .config(config)
        .build()
        .expect("Invalid gate configuration");

    let protected = Router::new()
        .route("/articles/{id}", get(article))
        .layer(gate.clone());

    let app = Router::new()
        .route("/session/{wallet}", post(open_session))
        .route("/usage/{wallet}", get(usage))
        .merge(protected)
        .with_state(gate)
        .layer(TraceLayer::new_for_http());

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .expect("PORT must be a valid u16 integer");
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], port).into();

    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", addr);
    axum::serve(listener, app).await.expect("Server failed");
}

async fn open_session(
    State(gate): State<Gate<ApprovingAgent>>,
    Path(wallet): Path<WalletKey>,
    headers: HeaderMap,
) -> Response {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let cookie = gate
        .issue_session(wallet, user_id)
        .map_err(|err| err.to_string())
        .and_then(|sealed| gate.session_cookie(&sealed).map_err(|err| err.to_string()));

    match cookie {
        Ok(cookie) => (StatusCode::CREATED, [(header::SET_COOKIE, cookie)]).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

async fn usage(
    State(gate): State<Gate<ApprovingAgent>>,
    Path(wallet): Path<WalletKey>,
) -> Json<Value> {
    let usage = gate.usage(&wallet);
    Json(json!(usage))
}

async fn article(Path(id): Path<u32>, Extension(grant): Extension<AccessGrant>) -> Json<Value> {
    Json(json!({
        "id": id,
        "wallet": grant.wallet,
        "body": "You have accessed a metered article!"
    }))
}
