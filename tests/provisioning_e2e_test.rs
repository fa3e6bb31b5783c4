use anyhow::Result;
use httpmock::prelude::*;
use httpmock::Mock;
use project_provisioner::adapters::InMemoryProjectStore;
use project_provisioner::core::auth::StaticIdentity;
use project_provisioner::{
    AppConfig, FailureStage, LifecycleStage, ProjectRequest, ProvisioningService, QuickstarterRequest, SystemKind,
};
use serde_json::json;
use std::sync::Arc;

/// 所有外部系統都指向同一個 mock server
fn config_for(server: &MockServer) -> AppConfig {
    config_with(server, &format!("{}/proxy-{{project}}", server.base_url()), "")
}

/// `extra` 接在最後，可加入 job 或其他子表
fn config_with(server: &MockServer, proxy_pattern: &str, extra: &str) -> AppConfig {
    let base = server.base_url();
    let content = format!(
        r#"
[identity]
base_url = "{base}"
api_path = "/crowd"

[issue_tracker]
base_url = "{base}"
api_path = "/jira/rest/api/latest"
admin_user = "svc-jira"
admin_password = "jira-pass"

[wiki]
base_url = "{base}"
api_path = "/wiki/rest"

[scm]
base_url = "{base}"
api_path = "/scm/rest/api/1.0"

[ci]
webhook_proxy_url_pattern = "{proxy_pattern}"
domain = ".apps.example.com"
console_url = "https://console.example.com"
trigger_secret = "global-secret"

[[ci.jobs]]
id = "java-service"
name = "java-service"
repository = "ods-quickstarters"
jenkinsfile_path = "be-java-springboot/Jenkinsfile"
{extra}
"#
    );
    AppConfig::from_toml_str(&content).unwrap()
}

const ADMIN_JOBS: &str = r#"
[[ci.jobs]]
id = "create-projects"
name = "create-projects"
repository = "ods-core"
admin_job = true

[[ci.jobs]]
id = "delete-projects"
name = "delete-projects"
repository = "ods-core"
admin_job = true

[[ci.jobs]]
id = "delete-components"
name = "delete-components"
repository = "ods-core"
admin_job = true

[ci.admin_jobs]
create_projects = "create-projects"
delete_projects = "delete-projects"
delete_components = "delete-components"
"#;

fn service(server: &MockServer, store: Arc<InMemoryProjectStore>) -> ProvisioningService {
    service_with(config_for(server), store)
}

fn service_with(config: AppConfig, store: Arc<InMemoryProjectStore>) -> ProvisioningService {
    let identity = StaticIdentity::new(Some("jdoe".to_string()), Some("s3cret".to_string()));
    ProvisioningService::from_config(&config, Arc::new(identity), store).unwrap()
}

fn request(components: &[&str]) -> ProjectRequest {
    ProjectRequest {
        key: "ABC".to_string(),
        name: "Demo".to_string(),
        quickstarters: components
            .iter()
            .map(|id| QuickstarterRequest {
                component_id: id.to_string(),
                component_type: "java-service".to_string(),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

struct Downstream<'a> {
    jira_create: Mock<'a>,
    jira_delete: Mock<'a>,
    jira_shortcut: Mock<'a>,
    jira_component: Mock<'a>,
    wiki_create: Mock<'a>,
    wiki_delete: Mock<'a>,
    scm_project: Mock<'a>,
    scm_project_delete: Mock<'a>,
    scm_repos: Mock<'a>,
    scm_repo_delete: Mock<'a>,
    scm_webhook: Mock<'a>,
}

async fn mock_downstream(server: &MockServer) -> Downstream<'_> {
    Downstream {
        jira_create: server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/jira/rest/api/latest/project")
                    .json_body_partial(r#"{"key":"ABC","lead":"svc-jira"}"#);
                then.status(201).json_body(json!({"id": 10000, "key": "ABC"}));
            })
            .await,
        jira_delete: server
            .mock_async(|when, then| {
                when.method(DELETE).path("/jira/rest/api/latest/project/ABC");
                then.status(204);
            })
            .await,
        jira_shortcut: server
            .mock_async(|when, then| {
                when.method(POST).path("/rest/projects/1.0/project/ABC/shortcut");
                then.status(201);
            })
            .await,
        jira_component: server
            .mock_async(|when, then| {
                when.method(POST).path("/jira/rest/api/latest/component");
                then.status(201);
            })
            .await,
        wiki_create: server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/wiki/rest/create-dialog/1.0/space-blueprint/create-space")
                    .json_body_partial(r#"{"spaceKey":"ABC"}"#);
                then.status(200).json_body(json!({"key": "ABC"}));
            })
            .await,
        wiki_delete: server
            .mock_async(|when, then| {
                when.method(DELETE).path("/wiki/rest/api/space/ABC");
                then.status(204);
            })
            .await,
        scm_project: server
            .mock_async(|when, then| {
                when.method(POST).path("/scm/rest/api/1.0/projects");
                then.status(201).json_body(json!({"key": "ABC"}));
            })
            .await,
        scm_project_delete: server
            .mock_async(|when, then| {
                when.method(DELETE).path("/scm/rest/api/1.0/projects/ABC");
                then.status(204);
            })
            .await,
        scm_repos: server
            .mock_async(|when, then| {
                when.method(POST).path("/scm/rest/api/1.0/projects/ABC/repos");
                then.status(201).json_body(json!({
                    "links": {
                        "clone": [{"href": "https://scm/scm/abc/repo.git", "name": "http"}],
                        "self": [{"href": "https://scm/projects/ABC/repos/repo/browse"}]
                    }
                }));
            })
            .await,
        scm_repo_delete: server
            .mock_async(|when, then| {
                when.method(DELETE).path("/scm/rest/api/1.0/projects/ABC/repos/abc-svc1");
                then.status(202);
            })
            .await,
        scm_webhook: server
            .mock_async(|when, then| {
                when.method(POST).path_contains("/webhooks");
                then.status(201);
            })
            .await,
    }
}

fn build_response(component: &str, number: u32) -> serde_json::Value {
    json!({
        "kind": "Build",
        "apiVersion": "build.openshift.io/v1",
        "metadata": {
            "name": format!("ods-qs-{}-{}", component, number),
            "namespace": "abc-cd",
            "labels": {"buildconfig": format!("ods-qs-{}", component)}
        },
        "status": {"phase": "New"}
    })
}

#[tokio::test]
async fn test_create_project_across_all_systems() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    let trigger = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-abc/build")
                .query_param("component", "ods-quickstarter-java-service-svc1")
                .query_param("jenkinsfile_path", "be-java-springboot/Jenkinsfile")
                .query_param_exists("trigger_secret");
            then.status(200).json_body(build_response("svc1", 1));
        })
        .await;

    let store = Arc::new(InMemoryProjectStore::new());
    let result = service(&server, store.clone())
        .create_project(request(&["svc1"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    assert_eq!(result.issue_tracker_url, Some(format!("{}/browse/ABC", server.base_url())));
    assert_eq!(result.wiki_url, Some(format!("{}/display/ABC", server.base_url())));
    assert_eq!(result.scm_url, Some(format!("{}/projects/ABC", server.base_url())));
    assert_eq!(result.build_engine_url.as_deref(), Some("https://jenkins-abc-cd.apps.example.com"));

    let components: Vec<_> = result.repositories_for_components().collect();
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].name, "abc-svc1");
    assert_eq!(result.executions.len(), 1);
    assert_eq!(
        result.executions[0].permalink,
        "https://jenkins-abc-cd.apps.example.com/job/abc-cd/job/abc-cd-ods-qs-svc1/1"
    );

    downstream.jira_create.assert_async().await;
    downstream.wiki_create.assert_async().await;
    downstream.scm_project.assert_async().await;
    assert_eq!(downstream.scm_repos.hits_async().await, 3);
    assert_eq!(downstream.scm_webhook.hits_async().await, 1);
    assert_eq!(downstream.jira_shortcut.hits_async().await, 3);
    assert_eq!(downstream.jira_component.hits_async().await, 1);
    trigger.assert_async().await;
    assert_eq!(downstream.jira_delete.hits_async().await, 0);

    let stored = store.records();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].request.scm_url, result.scm_url);
    assert!(stored[0].request.webhook_proxy_secret.is_some());
    Ok(())
}

#[tokio::test]
async fn test_ci_failure_rolls_back_in_reverse_order() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    let trigger = server
        .mock_async(|when, then| {
            when.method(POST).path("/proxy-abc/build");
            then.status(500).body("proxy exploded");
        })
        .await;

    let store = Arc::new(InMemoryProjectStore::new());
    let failure = service(&server, store.clone())
        .create_project(request(&["svc1"]))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, FailureStage::Creation);
    assert_eq!(failure.status, 500);
    assert!(failure.errors.iter().any(|e| e.contains("proxy exploded")));
    assert!(failure.leftovers.is_empty());

    trigger.assert_async().await;
    // SCM 只清理這次新增的 component repository
    downstream.scm_repo_delete.assert_async().await;
    assert_eq!(downstream.scm_project_delete.hits_async().await, 0);
    downstream.wiki_delete.assert_async().await;
    downstream.jira_delete.assert_async().await;
    assert_eq!(downstream.jira_shortcut.hits_async().await, 0);
    assert!(store.records().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_cleanup_is_reported_as_rollback() -> Result<()> {
    let server = MockServer::start_async().await;
    let jira_create = server
        .mock_async(|when, then| {
            when.method(POST).path("/jira/rest/api/latest/project");
            then.status(201);
        })
        .await;
    let jira_delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/jira/rest/api/latest/project/ABC");
            then.status(403).body("forbidden");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_contains("/create-space");
            then.status(400).body("space key taken");
        })
        .await;

    let failure = service(&server, Arc::new(InMemoryProjectStore::new()))
        .create_project(request(&[]))
        .await
        .unwrap_err();

    jira_create.assert_async().await;
    jira_delete.assert_async().await;
    assert_eq!(failure.stage, FailureStage::Rollback);
    assert_eq!(
        serde_json::to_value(&failure.leftovers)?,
        json!({"issue-tracker": {"BUGTRACKER_PROJECT": 1}})
    );
    Ok(())
}

#[tokio::test]
async fn test_without_runtime_platform_scm_and_ci_are_untouched() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    let trigger = server
        .mock_async(|when, then| {
            when.method(POST).path_contains("/build");
            then.status(200).json_body(build_response("svc1", 1));
        })
        .await;

    let mut req = request(&["svc1"]);
    req.wants_runtime_platform = false;
    let result = service(&server, Arc::new(InMemoryProjectStore::new()))
        .create_project(req)
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    assert!(result.issue_tracker_url.is_some());
    assert!(result.scm_url.is_none());
    assert_eq!(downstream.scm_project.hits_async().await, 0);
    assert_eq!(downstream.scm_repos.hits_async().await, 0);
    assert_eq!(trigger.hits_async().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_update_only_provisions_new_components() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    let trigger = server
        .mock_async(|when, then| {
            when.method(POST).path("/proxy-abc/build");
            then.status(200).json_body(build_response("svc", 2));
        })
        .await;

    let store = Arc::new(InMemoryProjectStore::new());
    let service = service(&server, store.clone());
    service
        .create_project(request(&["svc1"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    let updated = service
        .update_project(request(&["svc1", "svc2"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    // 第二次只新增 svc2：SCM 專案與 issue tracker 不會重建
    assert_eq!(downstream.scm_project.hits_async().await, 1);
    assert_eq!(downstream.jira_create.hits_async().await, 1);
    assert_eq!(downstream.wiki_create.hits_async().await, 1);
    assert_eq!(downstream.scm_repos.hits_async().await, 4);
    assert_eq!(trigger.hits_async().await, 2);
    assert_eq!(updated.executions.len(), 2);
    assert_eq!(updated.repositories_for_components().count(), 2);

    service
        .update_project(request(&["svc1", "svc2"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;
    assert_eq!(downstream.scm_repos.hits_async().await, 4);
    assert_eq!(trigger.hits_async().await, 2);

    let stored = store.records();
    assert_eq!(stored[0].request.quickstarters.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_unknown_admin_group_blocks_creation() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/crowd/group").query_param("groupname", "owners");
            then.status(200).json_body(json!({"name": "owners"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/crowd/group").query_param("groupname", "ghosts");
            then.status(404);
        })
        .await;

    let mut req = request(&["svc1"]);
    req.special_permission_set = true;
    req.admin_group = Some("owners".to_string());
    req.user_group = Some("ghosts".to_string());
    req.readonly_group = Some(String::new());

    let failure = service(&server, Arc::new(InMemoryProjectStore::new()))
        .create_project(req)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, FailureStage::Validation);
    assert_eq!(failure.status, 400);
    assert_eq!(failure.errors, vec!["userGroup 'ghosts' does not exist".to_string()]);
    assert_eq!(downstream.jira_create.hits_async().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_standalone_component_cleanup() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/proxy-abc/build");
            then.status(200).json_body(build_response("svc1", 1));
        })
        .await;

    let service = service(&server, Arc::new(InMemoryProjectStore::new()));
    service
        .create_project(request(&["svc1"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    let outcomes = service
        .cleanup("ABC", LifecycleStage::ComponentUpdate, &["svc1".to_string()])
        .await?;

    downstream.scm_repo_delete.assert_async().await;
    assert_eq!(downstream.jira_delete.hits_async().await, 0);
    // 沒有設定 delete-components job，CI 的 component 仍然存在
    assert_eq!(
        serde_json::to_value(outcomes.system(SystemKind::Ci))?,
        json!({"QUICKSTARTER": 1})
    );
    assert!(outcomes.system(SystemKind::Scm).is_some_and(|o| o.is_empty()));
    assert!(outcomes.store.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_unreachable_proxy_does_not_expose_trigger_secret() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    let config = config_with(&server, "http://127.0.0.1:1/proxy-{project}", "");

    let mut req = request(&["svc1"]);
    req.webhook_proxy_secret = Some("TOPSECRET-123".to_string());
    let failure = service_with(config, Arc::new(InMemoryProjectStore::new()))
        .create_project(req)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, FailureStage::Creation);
    assert!(failure.errors.iter().any(|e| e.contains("127.0.0.1:1/proxy-abc/build")));
    assert!(failure.errors.iter().all(|e| !e.contains("TOPSECRET-123")));
    assert!(!serde_json::to_string(&failure)?.contains("TOPSECRET-123"));
    assert!(!failure.to_string().contains("TOPSECRET-123"));
    downstream.scm_repo_delete.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_upgrade_to_runtime_platform_creates_platform_project() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    let platform = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-prov/build")
                .query_param("component", "ods-corejob-create-projects-abc");
            then.status(200).json_body(build_response("create-projects", 7));
        })
        .await;
    let trigger = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-abc/build")
                .query_param("component", "ods-quickstarter-java-service-svc1");
            then.status(200).json_body(build_response("svc1", 1));
        })
        .await;

    let store = Arc::new(InMemoryProjectStore::new());
    let service = service_with(config_with(&server, &format!("{}/proxy-{{project}}", server.base_url()), ADMIN_JOBS), store.clone());

    let mut plain = request(&[]);
    plain.wants_runtime_platform = false;
    let created = service.create_project(plain).await.map_err(|f| anyhow::anyhow!("{}", f))?;
    assert!(created.build_engine_url.is_none());
    assert_eq!(platform.hits_async().await, 0);

    let upgraded = service
        .update_project(request(&["svc1"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    platform.assert_async().await;
    trigger.assert_async().await;
    downstream.scm_project.assert_async().await;
    assert_eq!(upgraded.scm_url, Some(format!("{}/projects/ABC", server.base_url())));
    assert_eq!(upgraded.build_engine_url.as_deref(), Some("https://jenkins-abc-cd.apps.example.com"));
    assert_eq!(
        upgraded.dev_env_url.as_deref(),
        Some("https://console.example.com/console/project/abc-dev")
    );
    assert_eq!(upgraded.issue_tracker_url, created.issue_tracker_url);

    let stored = store.records();
    assert!(stored[0].request.wants_runtime_platform);
    assert!(stored[0].request.webhook_proxy_secret.is_some());
    assert_eq!(stored[0].result.build_engine_url, upgraded.build_engine_url);
    Ok(())
}

#[tokio::test]
async fn test_rejected_template_falls_back_to_default() -> Result<()> {
    let server = MockServer::start_async().await;
    let kanban = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/jira/rest/api/latest/project")
                .json_body_partial(r#"{"projectTemplateKey":"kanban-template"}"#);
            then.status(400).body("unknown template");
        })
        .await;
    let fallback = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/jira/rest/api/latest/project")
                .json_body_partial(r#"{"projectTemplateKey":"default-template","projectTypeKey":"software"}"#);
            then.status(201);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path_contains("/create-space");
            then.status(200).json_body(json!({"key": "ABC"}));
        })
        .await;

    let templates = r#"
[issue_tracker.project_templates.default]
template_key = "default-template"
project_type_key = "software"

[issue_tracker.project_templates.kanban]
template_key = "kanban-template"
project_type_key = "business"
"#;
    let config = config_with(&server, &format!("{}/proxy-{{project}}", server.base_url()), templates);

    let mut req = request(&[]);
    req.project_type = Some("kanban".to_string());
    req.wants_runtime_platform = false;
    let result = service_with(config, Arc::new(InMemoryProjectStore::new()))
        .create_project(req)
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    kanban.assert_async().await;
    fallback.assert_async().await;
    assert_eq!(result.issue_tracker_url, Some(format!("{}/browse/ABC", server.base_url())));
    Ok(())
}

#[tokio::test]
async fn test_failed_update_removes_only_the_new_component() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-abc/build")
                .query_param("component", "ods-quickstarter-java-service-svc1");
            then.status(200).json_body(build_response("svc1", 1));
        })
        .await;
    let broken_trigger = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-abc/build")
                .query_param("component", "ods-quickstarter-java-service-svc2");
            then.status(500).body("quickstarter exploded");
        })
        .await;
    let svc2_delete = server
        .mock_async(|when, then| {
            when.method(DELETE).path("/scm/rest/api/1.0/projects/ABC/repos/abc-svc2");
            then.status(202);
        })
        .await;

    let store = Arc::new(InMemoryProjectStore::new());
    let service = service(&server, store.clone());
    service
        .create_project(request(&["svc1"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    let failure = service.update_project(request(&["svc1", "svc2"])).await.unwrap_err();

    assert_eq!(failure.stage, FailureStage::Creation);
    assert!(failure.errors.iter().any(|e| e.contains("quickstarter exploded")));
    assert!(failure.leftovers.is_empty());
    broken_trigger.assert_async().await;
    svc2_delete.assert_async().await;
    assert_eq!(downstream.scm_repo_delete.hits_async().await, 0);
    assert_eq!(downstream.scm_project_delete.hits_async().await, 0);
    assert_eq!(downstream.wiki_delete.hits_async().await, 0);
    assert_eq!(downstream.jira_delete.hits_async().await, 0);

    let stored = store.records();
    assert_eq!(stored[0].request.quickstarters.len(), 1);
    assert!(!stored[0].result.has_component("svc2"));
    Ok(())
}

#[tokio::test]
async fn test_admin_jobs_remove_components_then_platform_project() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-prov/build")
                .query_param("component", "ods-corejob-create-projects-abc");
            then.status(200).json_body(build_response("create-projects", 1));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-abc/build")
                .query_param("component", "ods-quickstarter-java-service-svc1");
            then.status(200).json_body(build_response("svc1", 1));
        })
        .await;
    let delete_component = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-abc/build")
                .query_param("component", "ods-corejob-delete-components-svc1");
            then.status(200).json_body(build_response("delete-components", 1));
        })
        .await;
    let delete_project = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-prov/build")
                .query_param("component", "ods-corejob-delete-projects-abc");
            then.status(200).json_body(build_response("delete-projects", 1));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path_contains("/scm/rest/api/1.0/projects/ABC/repos/");
            then.status(202);
        })
        .await;

    let store = Arc::new(InMemoryProjectStore::new());
    let service = service_with(
        config_with(&server, &format!("{}/proxy-{{project}}", server.base_url()), ADMIN_JOBS),
        store.clone(),
    );
    service
        .create_project(request(&["svc1"]))
        .await
        .map_err(|f| anyhow::anyhow!("{}", f))?;

    let components = service
        .cleanup("ABC", LifecycleStage::ComponentUpdate, &["svc1".to_string()])
        .await?;
    assert!(components.is_clean());
    delete_component.assert_async().await;
    assert!(!store.records()[0].result.has_component("svc1"));

    let everything = service.cleanup("ABC", LifecycleStage::InitialCreation, &[]).await?;
    assert!(everything.is_clean(), "{}", serde_json::to_string(&everything)?);
    delete_project.assert_async().await;
    downstream.scm_project_delete.assert_async().await;
    downstream.wiki_delete.assert_async().await;
    downstream.jira_delete.assert_async().await;
    assert!(store.records().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_platform_project_is_removed_when_url_rendering_fails() -> Result<()> {
    let server = MockServer::start_async().await;
    let downstream = mock_downstream(&server).await;
    let create_project = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-prov/build")
                .query_param("component", "ods-corejob-create-projects-abc");
            then.status(200).json_body(build_response("create-projects", 1));
        })
        .await;
    let delete_project = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/proxy-prov/build")
                .query_param("component", "ods-corejob-delete-projects-abc");
            then.status(200).json_body(build_response("delete-projects", 1));
        })
        .await;

    let mut config = config_with(&server, &format!("{}/proxy-{{project}}", server.base_url()), ADMIN_JOBS);
    config.ci.dev_env_url_pattern = "{console}/{cluster}/{project}-dev".to_string();

    let store = Arc::new(InMemoryProjectStore::new());
    let failure = service_with(config, store.clone())
        .create_project(request(&["svc1"]))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, FailureStage::Creation);
    create_project.assert_async().await;
    delete_project.assert_async().await;
    downstream.scm_repo_delete.assert_async().await;
    downstream.jira_delete.assert_async().await;
    assert!(store.records().is_empty());
    Ok(())
}
