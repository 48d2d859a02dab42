// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use mockito::{Matcher, Server};
use remote_config_client::{
    ClientConfig, ClientError, ConfigDocument, Decode, Field, Parameter, RemoteConfigClient,
    TokenFactory, ValueType,
};
use serde::Deserialize;
use serde_json::json;

const RESOURCE: &str = "/v1/projects/demo/remoteConfig";

fn template(version: &str, welcome: &str) -> String {
    json!({
        "version": {"versionNumber": version, "updateOrigin": "REST_API"},
        "conditions": [
            {"name": "beta", "expression": "app.userProperty['beta'] == 'true'"}
        ],
        "parameters": {
            "welcome_message": {
                "valueType": "STRING",
                "defaultValue": {"value": welcome}
            },
            "dark_mode": {
                "valueType": "BOOLEAN",
                "conditionalValues": {
                    "beta": {"value": "true"},
                    "everyone": {"value": "false"}
                }
            },
            "theme": {
                "valueType": "JSON",
                "defaultValue": {"value": "{\"primary\":\"#112233\",\"sizes\":{\"body\":14}}"}
            },
            "legacy_banner": {
                "valueType": "STRING",
                "defaultValue": {"useInAppDefault": true}
            }
        },
        "parameterGroups": {
            "limits": {
                "description": "request limits",
                "parameters": {
                    "max_requests": {"valueType": "NUMBER", "defaultValue": {"value": "250"}},
                    "backoff_factor": {"valueType": "NUMBER", "defaultValue": {"value": "1.5"}}
                }
            }
        }
    })
    .to_string()
}

#[derive(Debug, Default, PartialEq, Deserialize)]
struct Theme {
    primary: String,
    sizes: HashMap<String, u32>,
}

#[derive(Debug, Default, PartialEq)]
struct Limits {
    max_requests: u32,
    backoff_factor: f32,
}

impl Decode for Limits {
    fn fields(&mut self) -> Vec<Field<'_>> {
        vec![
            Field::new("max_requests", &mut self.max_requests),
            Field::new("backoff_factor", &mut self.backoff_factor),
        ]
    }
}

#[derive(Debug, Default, PartialEq)]
struct AppSettings {
    welcome: String,
    dark_mode: bool,
    banner: String,
    theme: Theme,
    limits: Limits,
}

impl Decode for AppSettings {
    fn fields(&mut self) -> Vec<Field<'_>> {
        vec![
            Field::new("welcome", &mut self.welcome).tag("welcome_message"),
            Field::new("dark_mode", &mut self.dark_mode),
            Field::new("banner", &mut self.banner).tag("legacy_banner"),
            Field::json("theme", &mut self.theme),
            Field::nested("limits", &mut self.limits).tag("limits,group"),
        ]
    }
}

fn client_for(server: &Server) -> RemoteConfigClient {
    let config = ClientConfig::new("demo")
        .with_base_url(server.url())
        .with_allow_plaintext(true)
        .with_token(TokenFactory::new_from_static_token("test-token"));
    RemoteConfigClient::new(config).expect("client")
}

#[tokio::test]
async fn fetch_and_decode_into_application_settings() {
    let mut server = Server::new_async().await;
    let fetch = server
        .mock("GET", RESOURCE)
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("etag", "etag-1")
        .with_body(template("12", "Hello"))
        .create_async()
        .await;

    let client = client_for(&server);
    let document = client.fetch().await.expect("fetch");
    fetch.assert_async().await;
    assert_eq!(document.etag, "etag-1");
    assert_eq!(document.version_number(), Some(12));
    assert_eq!(document.conditions[0].name, "beta");

    let mut settings = AppSettings {
        banner: "built-in banner".to_string(),
        ..AppSettings::default()
    };
    document.decode_into(&mut settings).expect("decode");
    assert_eq!(
        settings,
        AppSettings {
            welcome: "Hello".to_string(),
            dark_mode: true,
            banner: "built-in banner".to_string(),
            theme: Theme {
                primary: "#112233".to_string(),
                sizes: HashMap::from([("body".to_string(), 14)]),
            },
            limits: Limits {
                max_requests: 250,
                backoff_factor: 1.5,
            },
        }
    );
}

#[tokio::test]
async fn update_recovers_from_a_single_conflict() {
    let mut server = Server::new_async().await;
    let initial = server
        .mock("GET", RESOURCE)
        .with_status(200)
        .with_header("etag", "T1")
        .with_body(template("1", "Hello"))
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let mut document = client.fetch().await.expect("fetch");
    initial.assert_async().await;
    initial.remove_async().await;

    // Another writer published version 2 in the meantime.
    let stale_put = server
        .mock("PUT", RESOURCE)
        .match_header("if-match", "T1")
        .with_status(409)
        .with_body(r#"{"error":{"status":"ABORTED"}}"#)
        .expect(1)
        .create_async()
        .await;
    let refetch = server
        .mock("GET", RESOURCE)
        .with_status(200)
        .with_header("etag", "T2")
        .with_body(template("2", "Hi"))
        .expect(1)
        .create_async()
        .await;
    let fresh_put = server
        .mock("PUT", RESOURCE)
        .match_header("if-match", "T2")
        .match_header("content-type", "application/json; charset=utf-8")
        .match_body(Matcher::PartialJson(json!({
            "parameters": {"welcome_message": {"defaultValue": {"value": "Welcome back"}}}
        })))
        .with_status(200)
        .with_header("etag", "T3")
        .with_body(template("3", "Welcome back"))
        .expect(1)
        .create_async()
        .await;

    document.parameters.insert(
        "welcome_message".to_string(),
        Parameter::with_default(ValueType::String, "Welcome back"),
    );
    client.update_in_place(&mut document).await.expect("update");

    stale_put.assert_async().await;
    refetch.assert_async().await;
    fresh_put.assert_async().await;
    assert_eq!(document.etag, "T3");
    assert_eq!(document.version_number(), Some(3));
}

#[tokio::test]
async fn persistent_conflict_is_surfaced() {
    let mut server = Server::new_async().await;
    let puts = server
        .mock("PUT", RESOURCE)
        .with_status(409)
        .with_body("conflict")
        .expect(2)
        .create_async()
        .await;
    let refetch = server
        .mock("GET", RESOURCE)
        .with_status(200)
        .with_header("etag", "T2")
        .with_body(template("2", "Hi"))
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server);
    let document = ConfigDocument {
        etag: "T1".to_string(),
        ..ConfigDocument::default()
    };
    let err = client.update(&document).await.expect_err("conflict");
    assert!(matches!(err, ClientError::Conflict { .. }));
    puts.assert_async().await;
    refetch.assert_async().await;
}

#[tokio::test]
async fn rollback_and_list_versions() {
    let mut server = Server::new_async().await;
    let rollback = server
        .mock("POST", "/v1/projects/demo/remoteConfig:rollback")
        .match_body(Matcher::Json(json!({"versionNumber": "7"})))
        .with_status(200)
        .with_header("etag", "etag-rb")
        .with_body(template("9", "Rolled back"))
        .create_async()
        .await;
    let first_page = server
        .mock("GET", "/v1/projects/demo/remoteConfig:listVersions")
        .match_query(Matcher::Missing)
        .with_status(200)
        .with_body(r#"{"versions":[{"versionNumber":"9","rollbackSource":"7"}],"nextPageToken":"next"}"#)
        .create_async()
        .await;
    let second_page = server
        .mock("GET", "/v1/projects/demo/remoteConfig:listVersions")
        .match_query(Matcher::UrlEncoded("pageToken".into(), "next".into()))
        .with_status(200)
        .with_body(r#"{"versions":[{"versionNumber":"8"}]}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let document = client.rollback(7).await.expect("rollback");
    assert_eq!(document.etag, "etag-rb");

    let versions = client
        .list_all_versions(Default::default())
        .await
        .expect("versions");
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].rollback_source, Some(7));
    assert_eq!(versions[1].version_number, Some(8));

    rollback.assert_async().await;
    first_page.assert_async().await;
    second_page.assert_async().await;
}
