use std::{convert::Infallible, pin::Pin};

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use tollgate_core::agent::PaymentAgent;
use tower::{Layer, Service};

use crate::gate::Gate;

impl<A: PaymentAgent, S> Layer<S> for Gate<A> {
    type Service = GateService<A, S>;

    fn layer(&self, inner: S) -> Self::Service {
        GateService {
            gate: self.clone(),
            inner,
        }
    }
}

/// Tower service produced by layering a [`Gate`] over an axum service.
pub struct GateService<A: PaymentAgent, S> {
    gate: Gate<A>,
    inner: S,
}

impl<A: PaymentAgent, S: Clone> Clone for GateService<A, S> {
    fn clone(&self) -> Self {
        GateService {
            gate: self.gate.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<A, S> Service<Request> for GateService<A, S>
where
    A: PaymentAgent,
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let gate = self.gate.clone();
        // The ready service goes into the future; its clone stays behind for the next call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = gate
                .handle_request(request, |req| async move {
                    match inner.call(req).await {
                        Ok(response) => response,
                    }
                })
                .await
                .unwrap_or_else(|err| err.into_response());

            Ok(response)
        })
    }
}
