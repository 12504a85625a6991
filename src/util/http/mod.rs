use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Serialize;

use crate::logging;

/// A thin wrapper over a configured `reqwest::Client`.
///
/// Every call is sent exactly once; callers decide what a failure means.
/// Timing of each request goes to the debug log.
#[derive(Clone)]
pub struct Http {
    client: Client,
}

impl Http {
    /// Builds a client that sends `user_agent` and gives up after `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        // reqwest is built without a bundled crypto provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        let client = Client::builder()
            // ===== 壓縮 =====
            .gzip(true)
            // ===== 超時設置 =====
            .connect_timeout(Duration::from_secs(8).min(timeout))
            .timeout(timeout)
            // ===== 連接池 =====
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(user_agent)
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))?;

        Ok(Http { client })
    }

    /// Performs an HTTP GET request.
    pub async fn get(
        &self,
        url: &str,
        headers: Option<header::HeaderMap>,
    ) -> reqwest::Result<Response> {
        self.send(
            Method::GET,
            url,
            headers,
            None::<fn(RequestBuilder) -> RequestBuilder>,
        )
        .await
    }

    /// Performs an HTTP POST request with a JSON body.
    pub async fn post_json<REQ: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: Option<header::HeaderMap>,
        req: &REQ,
    ) -> reqwest::Result<Response> {
        self.send(
            Method::POST,
            url,
            headers,
            Some(|rb: RequestBuilder| rb.json(req)),
        )
        .await
    }

    /// Performs an HTTP POST request with a url-encoded form body.
    pub async fn post_form<F: Serialize + ?Sized>(
        &self,
        url: &str,
        params: &F,
    ) -> reqwest::Result<Response> {
        self.send(
            Method::POST,
            url,
            None,
            Some(|rb: RequestBuilder| rb.form(params)),
        )
        .await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: Option<header::HeaderMap>,
        body: Option<impl FnOnce(RequestBuilder) -> RequestBuilder>,
    ) -> reqwest::Result<Response> {
        let visit_log = format!("{method}:{url}");
        let mut rb = self.client.request(method, url);

        if let Some(h) = headers {
            rb = rb.headers(h);
        }

        if let Some(body_fn) = body {
            rb = body_fn(rb);
        }

        let start = Instant::now();
        let res = rb.send().await;
        let elapsed = start.elapsed().as_millis();

        match &res {
            Ok(response) => logging::debug_file_async(format!(
                "{} {} {} ms",
                visit_log,
                response.status(),
                elapsed
            )),
            Err(why) => logging::debug_file_async(format!(
                "{} failed because {:?}. {} ms",
                visit_log, why, elapsed
            )),
        }

        res
    }
}

/// Builds the `Authorization: Bearer ...` header.
pub fn bearer(token: &str) -> Result<header::HeaderMap> {
    let mut headers = header::HeaderMap::new();
    let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|why| anyhow!("token is not a valid header value: {:?}", why))?;
    headers.insert(header::AUTHORIZATION, value);
    Ok(headers)
}
