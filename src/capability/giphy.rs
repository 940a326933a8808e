//! Giphy 能力：GetGif(query) 调用 Giphy 搜索接口，返回第一个结果的 GIF 地址
//!
//! 需要在 `[capabilities.giphy]` 中配置 `token`；可选 `endpoint` 覆盖接口地址。

use std::any::Any;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{ActionContext, ActionFailure, Capability, RuntimeAction};
use crate::config::CapabilitySettings;
use crate::core::HiveError;
use crate::dispatch::{downcast_target, Dispatch, OperationDef, ParamType, TypeDescriptor};
use crate::session::value_to_text;

const TYPE_NAME: &str = "GiphyCapability";
const DEFAULT_ENDPOINT: &str = "https://api.giphy.com/v1/gifs/search";
pub const TOKEN_KEY: &str = "token";

pub struct GiphyCapability {
    token: String,
    endpoint: String,
    client: Client,
}

impl GiphyCapability {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client: Client::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// 从能力配置构造；缺少 token 时无法加载
    pub fn from_settings(settings: &CapabilitySettings) -> Result<Self, HiveError> {
        let token = settings
            .get(TOKEN_KEY)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| HiveError::CapabilityLoad {
                name: "giphy".to_string(),
                reason: format!(
                    "missing Giphy API token (set capabilities.giphy.{TOKEN_KEY})"
                ),
            })?;
        let mut capability = Self::new(token.clone());
        if let Some(endpoint) = settings.get("endpoint") {
            capability = capability.with_endpoint(endpoint.clone());
        }
        Ok(capability)
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Dispatch for GiphyCapability {
    fn type_name(&self) -> &str {
        TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Capability for GiphyCapability {
    fn name(&self) -> &str {
        "giphy"
    }

    fn actions(&self) -> Vec<String> {
        vec!["GetGif".to_string()]
    }

    fn type_descriptors(&self) -> Vec<TypeDescriptor> {
        vec![TypeDescriptor::new(TYPE_NAME).operation(OperationDef::public(
            "GetGif",
            vec![ParamType::Any],
            |target, mut args| {
                let giphy = downcast_target::<GiphyCapability>(target)?;
                let query = args.pop().map(|v| value_to_text(&v)).unwrap_or_default();
                let action: Box<dyn RuntimeAction> = Box::new(GetGif {
                    query,
                    token: giphy.token.clone(),
                    endpoint: giphy.endpoint.clone(),
                    client: giphy.client.clone(),
                });
                Ok(Box::new(action))
            },
        ))]
    }
}

pub struct GetGif {
    query: String,
    token: String,
    endpoint: String,
    client: Client,
}

impl GetGif {
    pub fn query(&self) -> &str {
        &self.query
    }
}

/// 传输层错误与 5xx 视为可重试
fn classify(err: reqwest::Error) -> ActionFailure {
    let transient = err.is_timeout()
        || err.is_connect()
        || err.is_request()
        || err.status().is_some_and(|s| s.is_server_error());
    if transient {
        ActionFailure::Io(std::io::Error::other(err))
    } else {
        ActionFailure::Fatal(format!("Giphy request failed: {err}"))
    }
}

/// 从搜索响应中取第一个结果的原图地址
fn first_gif_url(body: &Value) -> Option<&str> {
    body.get("data")?
        .as_array()?
        .first()?
        .pointer("/images/original/url")?
        .as_str()
}

#[async_trait]
impl RuntimeAction for GetGif {
    fn name(&self) -> &str {
        "GetGif"
    }

    async fn execute(&mut self, ctx: &ActionContext) -> Result<Value, ActionFailure> {
        if self.query.trim().is_empty() {
            return Err(ActionFailure::Fatal("GetGif requires a search query".to_string()));
        }
        tracing::debug!(session = %ctx.session_id, query = %self.query, "Searching Giphy");
        let body: Value = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("api_key", self.token.as_str()),
                ("q", self.query.as_str()),
                ("limit", "1"),
            ])
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(classify)?
            .json()
            .await
            .map_err(classify)?;

        first_gif_url(&body)
            .map(|url| Value::String(url.to_string()))
            .ok_or_else(|| ActionFailure::Fatal(format!("No GIF found for \"{}\"", self.query)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use serde_json::json;

    #[test]
    fn test_token_required() {
        let err = GiphyCapability::from_settings(&CapabilitySettings::new()).err();
        assert!(matches!(err, Some(HiveError::CapabilityLoad { .. })));

        let mut settings = CapabilitySettings::new();
        settings.insert(TOKEN_KEY.to_string(), "  ".to_string());
        assert!(GiphyCapability::from_settings(&settings).is_err());

        settings.insert(TOKEN_KEY.to_string(), "secret".to_string());
        let giphy = GiphyCapability::from_settings(&settings).unwrap();
        assert_eq!(giphy.token(), "secret");
    }

    #[test]
    fn test_get_gif_built_through_dispatcher() {
        let giphy = GiphyCapability::new("secret");
        let dispatcher = Dispatcher::new();
        for d in giphy.type_descriptors() {
            dispatcher.register_type(d);
        }
        let action: Box<dyn RuntimeAction> = dispatcher
            .invoke(&giphy, "GetGif", vec![json!("cats")])
            .unwrap();
        assert_eq!(action.name(), "GetGif");
    }

    #[test]
    fn test_first_gif_url() {
        let body = json!({
            "data": [{"images": {"original": {"url": "https://media.giphy.com/cat.gif"}}}]
        });
        assert_eq!(first_gif_url(&body), Some("https://media.giphy.com/cat.gif"));
        assert_eq!(first_gif_url(&json!({"data": []})), None);
    }
}
