use crate::utils::error::ConfigError;

/// 替換 `{name}` 佔位符，任何未解析的佔位符都視為錯誤
pub fn render_template(template: &str, args: &[(&str, &str)]) -> Result<String, ConfigError> {
    let mut rendered = template.to_string();

    for (key, value) in args {
        let placeholder = format!("{{{}}}", key);
        if rendered.contains(&placeholder) {
            rendered = rendered.replace(&placeholder, value);
        }
    }

    // 檢查是否還有未替換的參數
    if let Some(start) = rendered.find('{') {
        if rendered[start..].contains('}') {
            let available: Vec<&str> = args.iter().map(|(k, _)| *k).collect();
            tracing::error!("❌ Unresolved placeholders in template: {}", template);
            return Err(ConfigError::InvalidValue {
                field: "template".to_string(),
                value: template.to_string(),
                reason: format!("Unresolved placeholders. Available: {:?}", available),
            });
        }
    }

    Ok(rendered)
}
