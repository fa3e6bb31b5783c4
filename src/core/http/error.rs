use thiserror::Error;

/// 單一 HTTP 呼叫的錯誤
///
/// `Status` 與 `Transport`/`Timeout` 分開，讓呼叫端可以判斷 404 是「不存在」
/// 還是整個 saga 必須中止。
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Could not {method} > {url} : {body}")]
    Status {
        status: u16,
        method: String,
        url: String,
        body: String,
    },

    #[error("Transport failure calling {method} {url}: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Timed out calling {method} {url}")]
    Timeout { method: String, url: String },

    #[error("Could not decode response of {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Pre-authentication against {url} failed: {message}")]
    PreAuthentication { url: String, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// 網路層失敗（連線、逾時），沒有收到任何 HTTP 回應
    pub fn is_transport(&self) -> bool {
        matches!(self, HttpError::Transport { .. } | HttpError::Timeout { .. })
    }

    pub fn body(&self) -> Option<&str> {
        match self {
            HttpError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}
