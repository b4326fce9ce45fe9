//! # Tollgate Paywall
//!
//! A pay-as-you-go access gate for wallet-identified HTTP sessions.
//!
//! Every request is charged against a wallet. Instead of paying per request, the wallet is
//! topped up in batches through a [`PaymentAgent`](tollgate_core::agent::PaymentAgent):
//! after `batch_threshold` requests a top-up runs in the background, and at
//! `batch_limit` the request waits for one. Failed top-ups accumulate in a circuit breaker
//! that hard-denies the wallet once `max_failures` is reached, until an operator resets it.
//! Session tokens older than the TTL force a seize-and-refill of the wallet balance.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tollgate_core::{agent_client::DefaultRemotePaymentAgent, config::GateConfig, token::TokenCipher};
//! use tollgate_paywall::gate::Gate;
//!
//! let gate = Gate::builder()
//!     .agent(DefaultRemotePaymentAgent::from_url("https://agent.example.com".parse()?))
//!     .cipher(TokenCipher::from_env()?)
//!     .config(GateConfig::from_env()?)
//!     .build()?;
//!
//! let app = axum::Router::new()
//!     .route("/articles/{id}", axum::routing::get(article))
//!     .layer(gate);
//! ```
//!
//! ## Modules
//!
//! - [`gate`]: The [`Gate`](gate::Gate) entrypoint tying the pieces to HTTP requests.
//! - [`controller`]: Click accounting and top-up triggering, see
//!   [`AccessController`](controller::AccessController).
//! - [`ttl`]: Session expiry and the seize-then-refill cycle.
//! - [`breaker`]: The consecutive-failure circuit breaker.
//! - [`store`]: Concurrent per-wallet usage counters and the swap lock.
//! - [`errors`]: Payment failure classification and HTTP error responses.
//!
//! ## Error Handling
//!
//! [`ErrorResponse`](errors::ErrorResponse) implements `IntoResponse` for Axum and can be
//! easily adapted to other frameworks. It returns these HTTP status codes:
//!
//! - `401 Unauthorized`: No readable session token.
//! - `402 Payment Required`: Click limit reached and the top-up failed.
//! - `503 Service Unavailable`: Top-ups are failing; retry after `Retry-After` seconds.
//! - `403 Forbidden`: Too many consecutive failures; access is suspended until reset.

pub mod breaker;
pub mod controller;
pub mod errors;
pub mod gate;
pub mod store;
pub mod ttl;

#[cfg(feature = "axum")]
pub mod axum;
