use crate::domain::model::ProjectRequest;
use crate::domain::ports::IdentityDirectory;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const ADMIN_GROUP: &str = "adminGroup";
pub const USER_GROUP: &str = "userGroup";
pub const READONLY_GROUP: &str = "readonlyGroup";
pub const ADMIN_USER: &str = "admin";

#[derive(Debug, Clone, Copy)]
enum Lookup {
    Group,
    User,
}

/// 在任何建立呼叫前，確認請求引用的群組與使用者存在
#[derive(Clone)]
pub struct PreconditionValidator {
    directory: Arc<dyn IdentityDirectory>,
}

impl PreconditionValidator {
    pub fn new(directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { directory }
    }

    /// 回傳失敗的欄位 → 值；空的代表全部通過
    pub async fn validate(&self, request: &ProjectRequest) -> BTreeMap<String, String> {
        let checks = [
            (ADMIN_GROUP, request.admin_group.as_deref(), Lookup::Group),
            (USER_GROUP, request.user_group.as_deref(), Lookup::Group),
            (READONLY_GROUP, request.readonly_group.as_deref(), Lookup::Group),
            (ADMIN_USER, request.admin_user.as_deref(), Lookup::User),
        ];

        let mut failures = BTreeMap::new();
        for (field, name, lookup) in checks {
            let Some(name) = name else { continue };
            if !self.exists(lookup, name).await {
                failures.insert(field.to_string(), name.to_string());
            }
        }

        if failures.is_empty() {
            tracing::debug!("✅ [{}] Identity preconditions satisfied", request.key);
        } else {
            tracing::info!("❌ [{}] Identity preconditions failed: {:?}", request.key, failures);
        }
        failures
    }

    /// 空白名稱代表沒有限制；查不到或查詢失敗都視為不存在
    async fn exists(&self, lookup: Lookup, name: &str) -> bool {
        if name.trim().is_empty() {
            return true;
        }

        let outcome = match lookup {
            Lookup::Group => self.directory.group_exists(name).await,
            Lookup::User => self.directory.user_exists(name).await,
        };

        match outcome {
            Ok(found) => found,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!("⚠️ Identity lookup of {:?} '{}' failed, treating as missing: {}", lookup, name, e);
                false
            }
        }
    }
}
