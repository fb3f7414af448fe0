use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracker_shared::{DatetimeLookupResponse, Direction, PageResponse, SearchResponse};
use url::Url;

use super::config::TableOptions;
use super::error::SourceError;

const USER_AGENT: &str = concat!("tracker-table/", env!("CARGO_PKG_VERSION"));

/// One page request.
///
/// `offset` is what the service expects: the 0-based index of the first row
/// for `down`, and the exclusive end of the window for `up` (the service
/// subtracts `limit`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub session_id: Option<i64>,
    pub modules: Vec<i64>,
    pub limit: u64,
    pub offset: u64,
    pub direction: Direction,
}

impl PageQuery {
    /// Query covering ids `start_id..start_id + limit`.
    pub fn window(
        session_id: Option<i64>,
        modules: Vec<i64>,
        start_id: u64,
        limit: u64,
        direction: Direction,
    ) -> Self {
        let first_index = start_id.saturating_sub(1);
        let offset = match direction {
            Direction::Down => first_index,
            Direction::Up => first_index + limit,
        };
        Self {
            session_id,
            modules,
            limit,
            offset,
            direction,
        }
    }

    pub fn start_id(&self) -> u64 {
        match self.direction {
            Direction::Down => self.offset + 1,
            Direction::Up => self.offset.saturating_sub(self.limit) + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatetimeQuery {
    pub session_id: Option<i64>,
    pub modules: Vec<i64>,
    pub limit: u64,
    pub datetime_unix: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub field: String,
    pub value: String,
}

/// Remote row store behind the table.
pub trait DataSource: Send + Sync {
    fn fetch_page(&self, query: PageQuery) -> BoxFuture<'_, Result<PageResponse, SourceError>>;

    fn lookup_datetime(
        &self,
        query: DatetimeQuery,
    ) -> BoxFuture<'_, Result<DatetimeLookupResponse, SourceError>>;

    fn search(&self, query: SearchQuery) -> BoxFuture<'_, Result<SearchResponse, SourceError>>;
}

pub struct HttpDataSource {
    client: reqwest::Client,
    api_url: String,
}

impl HttpDataSource {
    pub fn new(options: &TableOptions) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.request_timeout())
            .build()?;
        Ok(Self::with_client(client, &options.api_url))
    }

    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn page_url(&self, query: &PageQuery) -> Result<Url, SourceError> {
        let mut params = session_params(query.session_id, &query.modules);
        params.push(("limit", query.limit.to_string()));
        params.push(("offset", query.offset.to_string()));
        params.push(("direction", query.direction.to_string()));
        Ok(Url::parse_with_params(&self.api_url, &params)?)
    }

    pub fn datetime_url(&self, query: &DatetimeQuery) -> Result<Url, SourceError> {
        let mut params = session_params(query.session_id, &query.modules);
        params.push(("limit", query.limit.to_string()));
        params.push(("datetime", query.datetime_unix.to_string()));
        params.push(("direction", Direction::Down.to_string()));
        Ok(Url::parse_with_params(
            &format!("{}/datetime", self.api_url),
            &params,
        )?)
    }

    pub fn search_url(&self, query: &SearchQuery) -> Result<Url, SourceError> {
        Ok(Url::parse_with_params(
            &format!("{}/search", self.api_url),
            &[("field", query.field.as_str()), ("value", query.value.as_str())],
        )?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        let resp = self.client.get(url.clone()).send().await.map_err(|e| {
            tracing::debug!(%url, kind = classify(&e), "request failed");
            SourceError::Transport(e)
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(resp.json::<T>().await?)
    }
}

fn session_params(session_id: Option<i64>, modules: &[i64]) -> Vec<(&'static str, String)> {
    let modules = modules
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let mut params = Vec::with_capacity(6);
    if let Some(id) = session_id {
        params.push(("id_session", id.to_string()));
    }
    params.push(("modules", modules));
    params
}

fn classify(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_decode() {
        "decode"
    } else if e.is_body() {
        "body"
    } else {
        "request"
    }
}

impl DataSource for HttpDataSource {
    fn fetch_page(&self, query: PageQuery) -> BoxFuture<'_, Result<PageResponse, SourceError>> {
        Box::pin(async move {
            let url = self.page_url(&query)?;
            self.get_json(url).await
        })
    }

    fn lookup_datetime(
        &self,
        query: DatetimeQuery,
    ) -> BoxFuture<'_, Result<DatetimeLookupResponse, SourceError>> {
        Box::pin(async move {
            let url = self.datetime_url(&query)?;
            self.get_json(url).await
        })
    }

    fn search(&self, query: SearchQuery) -> BoxFuture<'_, Result<SearchResponse, SourceError>> {
        Box::pin(async move {
            let url = self.search_url(&query)?;
            self.get_json(url).await
        })
    }
}
