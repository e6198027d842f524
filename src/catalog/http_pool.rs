use std::time::Duration;
use reqwest::{Client, ClientBuilder, Proxy};
use crate::errors::Result;

const USER_AGENT: &str = concat!("nasmytunes/", env!("CARGO_PKG_VERSION"));

/// Shared reqwest client for catalog traffic
pub struct HttpPool {
    client: Client,
    max_connections: usize,
    timeout: Duration,
}

impl HttpPool {
    pub fn new(max_connections: usize, timeout_seconds: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_seconds);
        let client = Self::builder(max_connections, timeout).build()?;

        Ok(Self {
            client,
            max_connections,
            timeout,
        })
    }

    pub fn with_proxy(mut self, proxy_url: &str) -> Result<Self> {
        let proxy = Proxy::all(proxy_url)?;
        self.client = Self::builder(self.max_connections, self.timeout)
            .proxy(proxy)
            .build()?;
        Ok(self)
    }

    fn builder(max_connections: usize, timeout: Duration) -> ClientBuilder {
        ClientBuilder::new()
            .pool_max_idle_per_host(max_connections)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .tcp_keepalive(Duration::from_secs(60))
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}
