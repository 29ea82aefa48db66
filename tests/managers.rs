//! Wire-level manager tests against a local HTTP double.

use std::time::Duration;

use mockito::Matcher;

use ci_onboard::ci_account::CiAccountManager;
use ci_onboard::ci_job::CiJobManager;
use ci_onboard::config::{CiServerConfig, RepoManagerConfig};
use ci_onboard::contract::{CiAccounts, CiJobs, PollOutcome, ProjectClassifier, RepoAccounts};
use ci_onboard::detect::{ProjectDetector, ProjectType};
use ci_onboard::http::Transport;
use ci_onboard::repo_account::RepoAccountManager;
use ci_onboard::templates::TemplateStore;

fn account_manager(server: &mockito::Server) -> CiAccountManager {
    CiAccountManager::new(
        CiServerConfig::new(server.url(), "admin", "t0ken"),
        TemplateStore::load(),
        Transport::new().unwrap(),
    )
}

fn job_manager(server: &mockito::Server) -> CiJobManager {
    CiJobManager::new(
        CiServerConfig::new(server.url(), "admin", "t0ken"),
        TemplateStore::load(),
        Transport::new().unwrap(),
    )
}

fn repo_manager(server: &mockito::Server) -> RepoAccountManager {
    RepoAccountManager::new(
        RepoManagerConfig::new(server.url(), "admin", "adminpw"),
        Transport::new().unwrap(),
    )
}

// ---------------------------------------------------------------------------
// CI accounts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_account_submits_config_and_binds_credentials() {
    let mut server = mockito::Server::new_async().await;

    let probe = server
        .mock("GET", "/job/Alice/config.xml")
        .with_status(404)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/createItem")
        .match_query(Matcher::UrlEncoded("name".into(), "Alice".into()))
        .match_body(Matcher::Regex("<displayName>Alice</displayName>".into()))
        .with_status(200)
        .create_async()
        .await;
    let domain_probe = server
        .mock(
            "GET",
            "/job/Alice/credentials/store/folder/domain/Services/config.xml",
        )
        .with_status(404)
        .create_async()
        .await;
    let domain_create = server
        .mock("POST", "/job/Alice/credentials/store/folder/createDomain")
        .with_status(200)
        .create_async()
        .await;
    let credential_create = server
        .mock(
            "POST",
            "/job/Alice/credentials/store/folder/domain/Services/createCredentials",
        )
        .match_body(Matcher::Regex("<password>s3cret</password>".into()))
        .with_status(200)
        .create_async()
        .await;

    let manager = account_manager(&server);
    manager.create_account("Alice", "s3cret").await.unwrap();

    probe.assert_async().await;
    create.assert_async().await;
    domain_probe.assert_async().await;
    domain_create.assert_async().await;
    credential_create.assert_async().await;
}

#[tokio::test]
async fn create_account_is_a_noop_when_the_account_exists() {
    let mut server = mockito::Server::new_async().await;
    let probe = server
        .mock("GET", "/job/Alice/config.xml")
        .with_status(200)
        .with_body("<com.cloudbees.hudson.plugins.folder.Folder/>")
        .create_async()
        .await;

    let manager = account_manager(&server);
    manager.create_account("Alice", "s3cret").await.unwrap();
    probe.assert_async().await;
}

#[tokio::test]
async fn query_account_round_trips_presence_and_absence() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/config.xml")
        .with_status(200)
        .with_body("<folder><displayName>Alice</displayName></folder>")
        .create_async()
        .await;
    server
        .mock("GET", "/job/Nobody/config.xml")
        .with_status(404)
        .create_async()
        .await;

    let manager = account_manager(&server);
    let present = manager.query_account("Alice").await.unwrap();
    assert!(present.is_some_and(|doc| !doc.is_empty()));
    assert!(manager.query_account("Nobody").await.unwrap().is_none());
}

#[tokio::test]
async fn bind_credential_converts_conflict_into_update() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock(
            "GET",
            "/job/Alice/credentials/store/folder/domain/Services/config.xml",
        )
        .with_status(200)
        .create_async()
        .await;
    server
        .mock(
            "POST",
            "/job/Alice/credentials/store/folder/domain/Services/createCredentials",
        )
        .with_status(409)
        .create_async()
        .await;
    let update = server
        .mock(
            "POST",
            "/job/Alice/credentials/store/folder/domain/Services/credential/nexus-repository/config.xml",
        )
        .match_body(Matcher::Regex("<password>second-pw</password>".into()))
        .with_status(200)
        .create_async()
        .await;

    let manager = account_manager(&server);
    manager.bind_credential("Alice", "second-pw").await.unwrap();
    update.assert_async().await;
}

#[tokio::test]
async fn patch_build_config_merges_the_settings_fragment() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/config.xml")
        .with_status(200)
        .with_body(
            "<folder><properties><configs class=\"sorted-set\">\n</configs></properties></folder>",
        )
        .create_async()
        .await;
    let write = server
        .mock("POST", "/job/Alice/config.xml")
        .match_body(Matcher::Regex("<id>nexus-login</id>".into()))
        .with_status(200)
        .create_async()
        .await;

    let manager = account_manager(&server);
    manager.patch_build_config("Alice").await.unwrap();
    write.assert_async().await;
}

#[tokio::test]
async fn patch_build_config_is_a_noop_when_already_wired() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/config.xml")
        .with_status(200)
        .with_body("<folder><configs><id>nexus-login</id></configs></folder>")
        .create_async()
        .await;
    // No write mock: a write would answer 501 and fail the call.

    let manager = account_manager(&server);
    manager.patch_build_config("Alice").await.unwrap();
}

#[tokio::test]
async fn delete_account_treats_absence_as_success() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/job/Gone/doDelete")
        .with_status(404)
        .create_async()
        .await;

    let manager = account_manager(&server);
    manager.delete_account("Gone").await.unwrap();
}

// ---------------------------------------------------------------------------
// CI jobs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_job_substitutes_repo_url_and_applies_mutator() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/job/API/config.xml")
        .with_status(404)
        .create_async()
        .await;
    let create = server
        .mock("POST", "/job/Alice/createItem")
        .match_query(Matcher::UrlEncoded("name".into(), "API".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("https://github.com/Alice/API".into()),
            Matcher::Regex("-PrepositoryURL=http://repo/alice/".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;

    let manager = job_manager(&server);
    manager
        .create_job(
            "Alice",
            ci_onboard::contract::JobSpec {
                name: "API",
                repo_url: "https://github.com/Alice/API",
                project_type: ProjectType::Freestyle,
            },
            Some(Box::new(|document| {
                document.replace(
                    "<tasks>publish</tasks>",
                    "<tasks>publish -PrepositoryURL=http://repo/alice/</tasks>",
                )
            })),
        )
        .await
        .unwrap();
    create.assert_async().await;
}

#[tokio::test]
async fn query_job_round_trips_presence_and_absence() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/job/API/config.xml")
        .with_status(200)
        .with_body("<project/>")
        .create_async()
        .await;
    server
        .mock("GET", "/job/Alice/job/Nope/config.xml")
        .with_status(404)
        .create_async()
        .await;

    let manager = job_manager(&server);
    assert!(manager.query_job("Alice", "API").await.unwrap().is_some());
    assert!(manager.query_job("Alice", "Nope").await.unwrap().is_none());
}

#[tokio::test]
async fn trigger_build_posts_to_the_job() {
    let mut server = mockito::Server::new_async().await;
    let build = server
        .mock("POST", "/job/Alice/job/API/build")
        .with_status(201)
        .create_async()
        .await;

    let manager = job_manager(&server);
    manager.trigger_build("Alice", "API").await.unwrap();
    build.assert_async().await;
}

#[tokio::test]
async fn poll_until_idle_returns_once_flags_clear() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/job/API/api/json")
        .with_status(200)
        .with_body(r#"{"name":"API","inQueue":false,"color":"blue"}"#)
        .create_async()
        .await;

    let manager = job_manager(&server);
    let outcome = manager
        .poll_until_idle(
            "Alice",
            "API",
            Duration::from_millis(5),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::Idle);
}

#[tokio::test]
async fn poll_until_idle_times_out_while_still_building() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/job/API/api/json")
        .with_status(200)
        .with_body(r#"{"name":"API","inQueue":true,"color":"blue_anime"}"#)
        .expect_at_least(1)
        .create_async()
        .await;

    let manager = job_manager(&server);
    let outcome = manager
        .poll_until_idle(
            "Alice",
            "API",
            Duration::from_millis(5),
            Duration::from_millis(30),
        )
        .await
        .unwrap();
    assert_eq!(outcome, PollOutcome::TimedOut);
}

#[tokio::test]
async fn job_info_resolves_last_build_summaries() {
    let mut server = mockito::Server::new_async().await;
    let build_url = format!("{}/job/Alice/job/API/1/", server.url());
    let job_body = format!(
        r#"{{"name":"API","url":"{0}/job/Alice/job/API/","inQueue":false,"color":"blue",
            "lastBuild":{{"number":1,"url":"{1}"}},
            "lastStableBuild":{{"number":1,"url":"{1}"}},
            "lastFailedBuild":null,"lastCompletedBuild":null}}"#,
        server.url(),
        build_url
    );
    server
        .mock("GET", "/job/Alice/job/API/api/json")
        .with_status(200)
        .with_body(job_body)
        .create_async()
        .await;
    server
        .mock("GET", "/job/Alice/job/API/1/api/json")
        .with_status(200)
        .with_body(format!(
            r#"{{"result":"SUCCESS","number":1,"url":"{build_url}","timestamp":1717000000,"building":false}}"#
        ))
        .expect_at_least(1)
        .create_async()
        .await;

    let manager = job_manager(&server);
    let info = manager
        .job_info("Alice", "API")
        .await
        .unwrap()
        .expect("job exists");

    assert_eq!(info.name, "API");
    let last = info.last_build.expect("last build resolved");
    assert_eq!(last.result, "SUCCESS");
    assert_eq!(last.number, 1);
    assert_eq!(last.timestamp, 1717000000);
    assert!(info.last_stable_build.is_some());
    assert!(info.last_failed_build.is_none());
    assert!(info.last_completed_build.is_none());
}

#[tokio::test]
async fn job_info_is_none_for_missing_jobs() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/job/Alice/job/Nope/api/json")
        .with_status(404)
        .create_async()
        .await;

    let manager = job_manager(&server);
    assert!(manager.job_info("Alice", "Nope").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Repository accounts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provision_creates_repository_role_and_user() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/service/rest/v1/repositories/someuser")
        .with_status(404)
        .create_async()
        .await;
    let repo = server
        .mock("POST", "/service/rest/v1/repositories/maven/hosted")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "name": "someuser",
            "maven": {"versionPolicy": "MIXED", "layoutPolicy": "STRICT"}
        })))
        .with_status(201)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/security/roles/someuser")
        .with_status(404)
        .create_async()
        .await;
    let role = server
        .mock("POST", "/service/rest/v1/security/roles")
        .match_body(Matcher::PartialJson(serde_json::json!({"id": "someuser"})))
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/security/users")
        .match_query(Matcher::UrlEncoded("userId".into(), "someuser".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let user = server
        .mock("POST", "/service/rest/v1/security/users")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "userId": "someuser",
            "password": "s3cret",
            "roles": ["someuser"]
        })))
        .with_status(200)
        .create_async()
        .await;

    let manager = repo_manager(&server);
    manager.provision("SomeUser", "s3cret").await.unwrap();

    repo.assert_async().await;
    role.assert_async().await;
    user.assert_async().await;
}

#[tokio::test]
async fn provision_retry_skips_existing_pieces() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/service/rest/v1/repositories/someuser")
        .with_status(200)
        .with_body(r#"{"name":"someuser","format":"maven2","type":"hosted"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/security/roles/someuser")
        .with_status(200)
        .with_body(r#"{"id":"someuser"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/security/users")
        .match_query(Matcher::UrlEncoded("userId".into(), "someuser".into()))
        .with_status(200)
        .with_body(r#"[{"userId":"someuser"}]"#)
        .create_async()
        .await;
    // No POST mocks: any creation attempt would answer 501 and fail.

    let manager = repo_manager(&server);
    manager.provision("SomeUser", "s3cret").await.unwrap();
}

#[tokio::test]
async fn provision_completes_only_the_missing_piece() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/service/rest/v1/repositories/someuser")
        .with_status(200)
        .with_body(r#"{"name":"someuser"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/security/roles/someuser")
        .with_status(200)
        .with_body(r#"{"id":"someuser"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/security/users")
        .match_query(Matcher::UrlEncoded("userId".into(), "someuser".into()))
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;
    let user = server
        .mock("POST", "/service/rest/v1/security/users")
        .with_status(200)
        .create_async()
        .await;

    let manager = repo_manager(&server);
    manager.provision("SomeUser", "s3cret").await.unwrap();
    user.assert_async().await;
}

#[tokio::test]
async fn deprovision_continues_past_absent_resources() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", "/service/rest/v1/repositories/someuser")
        .with_status(204)
        .create_async()
        .await;
    server
        .mock("DELETE", "/service/rest/v1/security/roles/someuser")
        .with_status(404)
        .create_async()
        .await;
    let user = server
        .mock("DELETE", "/service/rest/v1/security/users/someuser")
        .with_status(204)
        .create_async()
        .await;

    let manager = repo_manager(&server);
    manager.deprovision("SomeUser").await.unwrap();
    user.assert_async().await;
}

#[tokio::test]
async fn deprovision_stops_at_the_first_hard_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", "/service/rest/v1/repositories/someuser")
        .with_status(204)
        .create_async()
        .await;
    server
        .mock("DELETE", "/service/rest/v1/security/roles/someuser")
        .with_status(500)
        .create_async()
        .await;
    // The user deletion must not be attempted; an attempt would hit the
    // catch-all 501 and this test asserts on the role error instead.

    let manager = repo_manager(&server);
    let error = manager.deprovision("SomeUser").await.unwrap_err();
    assert!(error.is_server_error());
}

#[tokio::test]
async fn change_password_updates_an_existing_user() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/service/rest/v1/security/users")
        .match_query(Matcher::UrlEncoded("userId".into(), "someuser".into()))
        .with_status(200)
        .with_body(r#"[{"userId":"someuser"}]"#)
        .create_async()
        .await;
    let update = server
        .mock("PUT", "/service/rest/v1/security/users/someuser/change-password")
        .match_body("new-pw")
        .with_status(200)
        .create_async()
        .await;

    let manager = repo_manager(&server);
    manager.change_password("SomeUser", "new-pw").await.unwrap();
    update.assert_async().await;
}

#[tokio::test]
async fn change_password_degrades_to_provision_for_missing_users() {
    let mut server = mockito::Server::new_async().await;
    // Both the password-change probe and the provision step ask for the
    // user and get an empty listing.
    server
        .mock("GET", "/service/rest/v1/security/users")
        .match_query(Matcher::UrlEncoded("userId".into(), "someuser".into()))
        .with_status(200)
        .with_body("[]")
        .expect_at_least(2)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/repositories/someuser")
        .with_status(200)
        .with_body(r#"{"name":"someuser"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/service/rest/v1/security/roles/someuser")
        .with_status(200)
        .with_body(r#"{"id":"someuser"}"#)
        .create_async()
        .await;
    let user = server
        .mock("POST", "/service/rest/v1/security/users")
        .match_body(Matcher::PartialJson(serde_json::json!({"password": "new-pw"})))
        .with_status(200)
        .create_async()
        .await;

    let manager = repo_manager(&server);
    manager.change_password("SomeUser", "new-pw").await.unwrap();
    user.assert_async().await;
}

// ---------------------------------------------------------------------------
// Project type detection
// ---------------------------------------------------------------------------

fn detector(server: &mockito::Server) -> ProjectDetector {
    ProjectDetector::with_hosts(Transport::new().unwrap(), server.url(), server.url())
}

#[tokio::test]
async fn detects_maven_from_the_first_marker() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/repos/Alice/API")
        .with_status(200)
        .with_body(r#"{"default_branch":"main"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/Alice/API/main/pom.xml")
        .with_status(200)
        .with_body("<project/>")
        .create_async()
        .await;

    let detector = detector(&server);
    let classification = detector
        .classify("https://github.com/Alice/API")
        .await;
    assert_eq!(classification, ProjectType::Maven);
}

#[tokio::test]
async fn defaults_to_freestyle_without_markers() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/repos/Alice/Tool")
        .with_status(200)
        .with_body(r#"{"default_branch":"master"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/Alice/Tool/master/pom.xml")
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", "/Alice/Tool/master/dependency-reduced-pom.xml")
        .with_status(404)
        .create_async()
        .await;

    let detector = detector(&server);
    let classification = detector
        .classify("https://github.com/Alice/Tool")
        .await;
    assert_eq!(classification, ProjectType::Freestyle);
}

#[tokio::test]
async fn probe_errors_resolve_conservatively_to_freestyle() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/repos/Alice/Flaky")
        .with_status(200)
        .with_body(r#"{"default_branch":"main"}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/Alice/Flaky/main/pom.xml")
        .with_status(500)
        .create_async()
        .await;
    // The scan must terminate early: no mock for the second marker.

    let detector = detector(&server);
    let classification = detector
        .classify("https://github.com/Alice/Flaky")
        .await;
    assert_eq!(classification, ProjectType::Freestyle);
}

#[tokio::test]
async fn repository_lookup_failure_defaults_to_freestyle() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/repos/Alice/Missing")
        .with_status(500)
        .create_async()
        .await;

    let detector = detector(&server);
    let classification = detector
        .classify("https://github.com/Alice/Missing")
        .await;
    assert_eq!(classification, ProjectType::Freestyle);
}
