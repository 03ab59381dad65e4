use relaytv_core::models::StreamRequest;
use serde::Deserialize;

use crate::GatewayError;

/// Raw query parameters of a gateway call:
/// `?url=<upstream>&mode=<vod|live>&raw=<bool>`
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RelayQuery {
    pub url: Option<String>,
    pub mode: Option<String>,
    pub raw: Option<String>,
}

impl RelayQuery {
    pub fn into_request(self) -> Result<StreamRequest, GatewayError> {
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(GatewayError::MissingUrl)?;
        Ok(StreamRequest::from_query(
            Some(url),
            self.mode.as_deref(),
            self.raw.as_deref(),
        )?)
    }
}
