use reqwest::Client;
use std::time::Duration;
use crate::error::{AppError, Result};

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 10;

pub fn create_http_client(connect_timeout: Duration, request_timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .tcp_nodelay(true)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .build()
        .map_err(|e| AppError::InvalidConfiguration(format!("failed to build HTTP client: {}", e)))?;

    Ok(client)
}
