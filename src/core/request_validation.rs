//! 請求欄位檢查與正規化，在任何外部呼叫之前執行

use crate::domain::model::{ProjectRequest, QuickstarterRequest};
use crate::utils::error::ProvisioningError;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

const MAX_DESCRIPTION_LENGTH: usize = 100;
const TRUNCATED_DESCRIPTION_LENGTH: usize = 99;
const COMPONENT_ID_MIN_LENGTH: usize = 3;
const COMPONENT_ID_MAX_LENGTH: usize = 40;

const PROJECT_KEY_PATTERN: &str = r"^[A-Za-z][-A-Za-z0-9]*$";
const COMPONENT_ID_PATTERN: &str = r"^(([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9])?$";

fn project_key_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(PROJECT_KEY_PATTERN).ok()).as_ref()
}

fn component_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(COMPONENT_ID_PATTERN).ok()).as_ref()
}

/// 檢查必要欄位並正規化：key 轉大寫、過長的描述截斷
pub fn normalize_request(mut request: ProjectRequest) -> Result<ProjectRequest, ProvisioningError> {
    let key = request.key.trim();
    if key.is_empty() {
        return Err(ProvisioningError::validation("Project key is mandatory"));
    }
    if !project_key_regex().is_some_and(|re| re.is_match(key)) {
        return Err(ProvisioningError::validation(format!(
            "Project key '{}' must match {}",
            key, PROJECT_KEY_PATTERN
        )));
    }
    request.key = key.to_uppercase();

    if request.name.trim().is_empty() {
        return Err(ProvisioningError::validation("Project name is mandatory"));
    }

    if let Some(description) = &request.description {
        if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            request.description = Some(description.chars().take(TRUNCATED_DESCRIPTION_LENGTH).collect());
        }
    }

    validate_quickstarters(&request.quickstarters)?;

    Ok(request)
}

pub fn validate_quickstarters(quickstarters: &[QuickstarterRequest]) -> Result<(), ProvisioningError> {
    let mut seen = HashSet::new();

    for quickstarter in quickstarters {
        let id = quickstarter.component_id.as_str();
        let length = id.chars().count();

        if !(COMPONENT_ID_MIN_LENGTH..=COMPONENT_ID_MAX_LENGTH).contains(&length) {
            return Err(ProvisioningError::validation(format!(
                "Component id '{}' must be between {} and {} characters",
                id, COMPONENT_ID_MIN_LENGTH, COMPONENT_ID_MAX_LENGTH
            )));
        }
        if !component_id_regex().is_some_and(|re| re.is_match(id)) {
            return Err(ProvisioningError::validation(format!(
                "Component id '{}' must match {}",
                id, COMPONENT_ID_PATTERN
            )));
        }
        if quickstarter.component_type.trim().is_empty() {
            return Err(ProvisioningError::validation(format!(
                "Component '{}' has no component type",
                id
            )));
        }
        if id.eq_ignore_ascii_case(&quickstarter.component_type) {
            return Err(ProvisioningError::validation(format!(
                "Component id '{}' must differ from its component type",
                id
            )));
        }
        if !seen.insert(id.to_lowercase()) {
            return Err(ProvisioningError::validation(format!(
                "Component id '{}' is requested more than once",
                id
            )));
        }
    }

    Ok(())
}
