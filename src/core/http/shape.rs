//! 回應格式描述
//!
//! 每個 adapter 方法在編譯期就決定回應要怎麼解析：
//! 不需要內容、原始字串、單一物件，或物件列表。

use serde::de::DeserializeOwned;
use std::marker::PhantomData;

pub trait ResponseShape {
    type Output;

    fn decode(body: &str) -> Result<Self::Output, String>;
}

/// 不解析回應內容
pub struct NoContent;

/// 回應內容原樣回傳
pub struct RawText;

/// 單一 JSON 物件
pub struct Object<T>(PhantomData<T>);

/// JSON 陣列；單一物件視為只有一個元素的陣列
pub struct ListOf<T>(PhantomData<T>);

impl ResponseShape for NoContent {
    type Output = ();

    fn decode(_body: &str) -> Result<Self::Output, String> {
        Ok(())
    }
}

impl ResponseShape for RawText {
    type Output = String;

    fn decode(body: &str) -> Result<Self::Output, String> {
        Ok(body.to_string())
    }
}

impl<T: DeserializeOwned> ResponseShape for Object<T> {
    type Output = T;

    fn decode(body: &str) -> Result<Self::Output, String> {
        serde_json::from_str(body).map_err(|e| e.to_string())
    }
}

impl<T: DeserializeOwned> ResponseShape for ListOf<T> {
    type Output = Vec<T>;

    fn decode(body: &str) -> Result<Self::Output, String> {
        let value: serde_json::Value = serde_json::from_str(body).map_err(|e| e.to_string())?;
        match value {
            serde_json::Value::Array(_) => serde_json::from_value(value).map_err(|e| e.to_string()),
            single => serde_json::from_value(single)
                .map(|item| vec![item])
                .map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Job {
        id: String,
    }

    #[test]
    fn test_no_content_ignores_body() {
        assert!(NoContent::decode("<html>not json</html>").is_ok());
    }

    #[test]
    fn test_raw_text_keeps_body() {
        assert_eq!(RawText::decode("plain").unwrap(), "plain");
    }

    #[test]
    fn test_list_accepts_single_object() {
        let jobs = ListOf::<Job>::decode(r#"{"id":"a"}"#).unwrap();
        assert_eq!(jobs, vec![Job { id: "a".to_string() }]);

        let jobs = ListOf::<Job>::decode(r#"[{"id":"a"},{"id":"b"}]"#).unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[test]
    fn test_object_rejects_invalid_json() {
        assert!(Object::<Job>::decode("").is_err());
        assert!(Object::<Job>::decode(r#"{"name":"x"}"#).is_err());
    }
}
