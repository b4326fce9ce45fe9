use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    agent::{PaymentAgent, SeizeOutcome, SeizeRequest, TopUpOutcome, TopUpRequest},
    types::{AmountValue, WalletKey},
};

/// A remote payment agent that communicates over HTTP.
///
/// Top-ups are `POST`ed to `{base_url}/top-up` and seizures to `{base_url}/seize`.
/// Endpoints are resolved with [`Url::join`], so a base path needs a trailing slash.
/// You can customize the request and response bodies for each call.
///
/// # Type Parameters
///
/// - `TReq`: The request body for top-ups, must be convertible from [`TopUpRequest`] and serializable.
/// - `TRes`: The response body for top-ups, must be convertible into [`TopUpOutcome`] and deserializable.
/// - `SReq`: The request body for seizures, must be convertible from [`SeizeRequest`] and serializable.
/// - `SRes`: The response body for seizures, must be convertible into [`SeizeOutcome`] and deserializable.
#[derive(Debug, Clone)]
pub struct RemotePaymentAgent<TReq, TRes, SReq, SRes>
where
    TReq: From<TopUpRequest> + Serialize,
    TRes: IntoTopUpOutcome + for<'de> Deserialize<'de>,
    SReq: From<SeizeRequest> + Serialize,
    SRes: IntoSeizeOutcome + for<'de> Deserialize<'de>,
{
    pub base_url: Url,
    pub client: reqwest::Client,
    pub headers: HeaderMap,
    pub _phantom: std::marker::PhantomData<(TReq, TRes, SReq, SRes)>,
}

pub trait IntoTopUpOutcome {
    fn into_top_up_outcome(self) -> TopUpOutcome;
}

pub trait IntoSeizeOutcome {
    fn into_seize_outcome(self) -> SeizeOutcome;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultTopUpRequest {
    pub user_id: String,
    pub wallet: WalletKey,
    pub amount: AmountValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultSeizeRequest {
    pub user_id: String,
    pub wallet: WalletKey,
}

/// `{ success, reference?, error? }`, shared by both endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultAgentResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<TopUpRequest> for DefaultTopUpRequest {
    fn from(request: TopUpRequest) -> Self {
        DefaultTopUpRequest {
            user_id: request.user_id,
            wallet: request.wallet,
            amount: request.amount,
        }
    }
}

impl From<SeizeRequest> for DefaultSeizeRequest {
    fn from(request: SeizeRequest) -> Self {
        DefaultSeizeRequest {
            user_id: request.user_id,
            wallet: request.wallet,
        }
    }
}

impl IntoTopUpOutcome for DefaultAgentResponse {
    fn into_top_up_outcome(self) -> TopUpOutcome {
        if self.success {
            TopUpOutcome::success(self.reference.unwrap_or_default())
        } else {
            TopUpOutcome::failed(
                self.error
                    .unwrap_or_else(|| "top-up rejected without reason".to_string()),
            )
        }
    }
}

impl IntoSeizeOutcome for DefaultAgentResponse {
    fn into_seize_outcome(self) -> SeizeOutcome {
        if self.success {
            SeizeOutcome::success(self.reference)
        } else {
            SeizeOutcome::failed(
                self.error
                    .unwrap_or_else(|| "seizure rejected without reason".to_string()),
            )
        }
    }
}

/// A type alias for a RemotePaymentAgent using the default request and response types.
pub type DefaultRemotePaymentAgent = RemotePaymentAgent<
    DefaultTopUpRequest,
    DefaultAgentResponse,
    DefaultSeizeRequest,
    DefaultAgentResponse,
>;

impl<TReq, TRes, SReq, SRes> RemotePaymentAgent<TReq, TRes, SReq, SRes>
where
    TReq: From<TopUpRequest> + Serialize,
    TRes: IntoTopUpOutcome + for<'de> Deserialize<'de>,
    SReq: From<SeizeRequest> + Serialize,
    SRes: IntoSeizeOutcome + for<'de> Deserialize<'de>,
{
    pub fn new_from_url(base_url: Url) -> Self {
        RemotePaymentAgent {
            base_url,
            client: reqwest::Client::new(),
            headers: HeaderMap::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn with_top_up_types<NewTReq, NewTRes>(
        self,
    ) -> RemotePaymentAgent<NewTReq, NewTRes, SReq, SRes>
    where
        NewTReq: From<TopUpRequest> + Serialize,
        NewTRes: IntoTopUpOutcome + for<'de> Deserialize<'de>,
    {
        RemotePaymentAgent {
            base_url: self.base_url,
            client: self.client,
            headers: self.headers,
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn with_seize_types<NewSReq, NewSRes>(
        self,
    ) -> RemotePaymentAgent<TReq, TRes, NewSReq, NewSRes>
    where
        NewSReq: From<SeizeRequest> + Serialize,
        NewSRes: IntoSeizeOutcome + for<'de> Deserialize<'de>,
    {
        RemotePaymentAgent {
            base_url: self.base_url,
            client: self.client,
            headers: self.headers,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Attach a static header, e.g. an API key, to every call.
    pub fn header(mut self, key: &HeaderName, value: &HeaderValue) -> Self {
        self.headers.insert(key, value.to_owned());
        self
    }
}

impl DefaultRemotePaymentAgent {
    pub fn from_url(base_url: Url) -> Self {
        RemotePaymentAgent::new_from_url(base_url)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemotePaymentAgentError {
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("HTTP request error: {0}")]
    HttpRequestError(#[from] reqwest::Error),
}

impl<TReq, TRes, SReq, SRes> PaymentAgent for RemotePaymentAgent<TReq, TRes, SReq, SRes>
where
    TReq: From<TopUpRequest> + Serialize + Send + Sync + 'static,
    TRes: IntoTopUpOutcome + for<'de> Deserialize<'de> + Send + Sync + 'static,
    SReq: From<SeizeRequest> + Serialize + Send + Sync + 'static,
    SRes: IntoSeizeOutcome + for<'de> Deserialize<'de> + Send + Sync + 'static,
{
    type Error = RemotePaymentAgentError;

    async fn top_up(&self, request: TopUpRequest) -> Result<TopUpOutcome, Self::Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Requesting top-up: agent='{}', wallet='{}', amount={}",
            self.base_url,
            request.wallet,
            request.amount
        );

        let result = self
            .client
            .post(self.base_url.join("top-up")?)
            .headers(self.headers.clone())
            .json(&TReq::from(request))
            .send()
            .await?
            .json::<TRes>()
            .await?;

        Ok(result.into_top_up_outcome())
    }

    async fn seize(&self, request: SeizeRequest) -> Result<SeizeOutcome, Self::Error> {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Requesting seizure: agent='{}', wallet='{}'",
            self.base_url,
            request.wallet
        );

        let result = self
            .client
            .post(self.base_url.join("seize")?)
            .headers(self.headers.clone())
            .json(&SReq::from(request))
            .send()
            .await?
            .json::<SRes>()
            .await?;

        Ok(result.into_seize_outcome())
    }
}
