use super::client::HttpClient;
use super::error::HttpError;
use super::shape::ResponseShape;
use crate::core::auth::Credentials;
use crate::utils::template::render_template;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use std::collections::BTreeMap;

const INVALID_LOGIN_MARKER: &str = "Invalid username and password";

/// 請求內容：原始字串、表單、或序列化後的 JSON
#[derive(Debug, Clone, PartialEq)]
pub enum CallBody {
    Text(String),
    Form(BTreeMap<String, String>),
    Json(serde_json::Value),
}

/// 主要請求之前的 session 握手（例如表單登入）
#[derive(Debug, Clone)]
pub struct PreAuth {
    pub url: String,
    pub form: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
enum Target {
    Url(String),
    Template {
        template: String,
        args: Vec<(String, String)>,
    },
}

/// 單一 HTTP 呼叫的建構器
#[derive(Debug, Clone)]
pub struct HttpCall {
    method: Method,
    target: Option<Target>,
    body: Option<CallBody>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    credentials: Option<Credentials>,
    pre_auth: Option<PreAuth>,
}

impl HttpCall {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            target: None,
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
            credentials: None,
            pre_auth: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.target = Some(Target::Url(url.into()));
        self
    }

    /// `{name}` 形式的 URL 模板，於執行時替換
    pub fn url_template(mut self, template: impl Into<String>, args: &[(&str, &str)]) -> Self {
        self.target = Some(Target::Template {
            template: template.into(),
            args: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        self
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(CallBody::Text(body.into()));
        self
    }

    pub fn form_body(mut self, form: BTreeMap<String, String>) -> Self {
        self.body = Some(CallBody::Form(form));
        self
    }

    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(CallBody::Json(body));
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn basic_auth(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn pre_auth(mut self, url: impl Into<String>, form: BTreeMap<String, String>) -> Self {
        self.pre_auth = Some(PreAuth {
            url: url.into(),
            form,
        });
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn body(&self) -> Option<&CallBody> {
        self.body.as_ref()
    }

    /// 取得最終 URL（模板已替換）
    pub fn resolve_url(&self) -> Result<String, HttpError> {
        match &self.target {
            Some(Target::Url(url)) => Ok(url.clone()),
            Some(Target::Template { template, args }) => {
                let args: Vec<(&str, &str)> =
                    args.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                render_template(template, &args).map_err(|e| HttpError::InvalidRequest {
                    message: e.to_string(),
                })
            }
            None => Err(HttpError::InvalidRequest {
                message: format!("{} call without target url", self.method),
            }),
        }
    }

    /// 執行呼叫並依 `S` 解析回應
    ///
    /// 非 2xx 回應會回傳 [`HttpError::Status`]，帶有狀態碼、方法、URL 與原始回應內容。
    pub async fn execute<S: ResponseShape>(self, client: &HttpClient) -> Result<S::Output, HttpError> {
        let url = self.resolve_url()?;
        let method = self.method.to_string();

        if let Some(pre_auth) = &self.pre_auth {
            Self::pre_authenticate(client, pre_auth).await?;
        }

        tracing::debug!(method = %method, url = %url, "📡 Calling remote system");

        let mut request = client
            .inner()
            .request(self.method.clone(), &url)
            .header(ACCEPT, "application/json");

        for (key, value) in &self.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        if !self.query.is_empty() {
            request = request.query(&self.query);
        }

        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, Some(credentials.secret()));
        }

        let has_content_type = self
            .headers
            .iter()
            .any(|(k, _)| k.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));

        request = match self.body {
            Some(CallBody::Text(text)) => {
                let request = if has_content_type {
                    request
                } else {
                    request.header(CONTENT_TYPE, "application/json; charset=utf-8")
                };
                request.body(text)
            }
            Some(CallBody::Form(form)) => request.form(&form),
            Some(CallBody::Json(json)) => request.json(&json),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(e, &method, &url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(e, &method, &url))?;

        if !status.is_success() {
            tracing::debug!(
                method = %method,
                url = %url,
                status = status.as_u16(),
                "❌ Remote system rejected call"
            );
            return Err(HttpError::Status {
                status: status.as_u16(),
                method,
                url,
                body,
            });
        }

        S::decode(&body).map_err(|message| HttpError::Decode { url, message })
    }

    async fn pre_authenticate(client: &HttpClient, pre_auth: &PreAuth) -> Result<(), HttpError> {
        tracing::debug!(url = %pre_auth.url, "🔐 Pre-authenticating session");

        let response = client
            .inner()
            .post(&pre_auth.url)
            .form(&pre_auth.form)
            .send()
            .await
            .map_err(|e| classify_transport(e, "POST", &pre_auth.url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_transport(e, "POST", &pre_auth.url))?;

        if !status.is_success() {
            return Err(HttpError::PreAuthentication {
                url: pre_auth.url.clone(),
                message: format!("status {}", status.as_u16()),
            });
        }

        if body.contains(INVALID_LOGIN_MARKER) {
            return Err(HttpError::PreAuthentication {
                url: pre_auth.url.clone(),
                message: INVALID_LOGIN_MARKER.to_string(),
            });
        }

        Ok(())
    }
}

fn classify_transport(error: reqwest::Error, method: &str, url: &str) -> HttpError {
    if error.is_timeout() {
        HttpError::Timeout {
            method: method.to_string(),
            url: url.to_string(),
        }
    } else {
        // reqwest 的訊息含完整 query，可能帶 secret
        HttpError::Transport {
            method: method.to_string(),
            url: url.to_string(),
            source: error.without_url(),
        }
    }
}
