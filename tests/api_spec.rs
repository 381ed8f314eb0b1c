use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use cohort_rest::api::{create_router, create_router_with_config, SecurityConfig};
use cohort_rest::config::PagingConfig;
use cohort_rest::db::Database;
use cohort_rest::models::*;
use serde_json::{json, Value};
use uuid::Uuid;

const BASE: &str = "/ws/rest/v1";

fn setup() -> TestServer {
    setup_with(SecurityConfig::disabled(), PagingConfig::default())
}

fn setup_with(security: SecurityConfig, paging: PagingConfig) -> TestServer {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let app = create_router_with_config(db, security, paging);
    TestServer::new(app).expect("Failed to create test server")
}

struct Fixture {
    location: Location,
    cohort_type: CohortType,
    village: CohortAttributeType,
}

async fn seed(server: &TestServer) -> Fixture {
    let location = server
        .post(&format!("{}/location", BASE))
        .json(&CreateLocationInput {
            name: "Kisumu".to_string(),
            description: None,
        })
        .await
        .json::<Location>();
    let cohort_type = server
        .post(&format!("{}/cohortm/cohorttype", BASE))
        .json(&CreateCohortTypeInput {
            name: "Community Group".to_string(),
            description: None,
        })
        .await
        .json::<CohortType>();
    let village = server
        .post(&format!("{}/cohortm/cohortattributetype", BASE))
        .json(&CreateCohortAttributeTypeInput {
            name: "village".to_string(),
            description: None,
        })
        .await
        .json::<CohortAttributeType>();

    Fixture {
        location,
        cohort_type,
        village,
    }
}

fn cohort_body(fixture: &Fixture, name: &str) -> Value {
    json!({
        "name": name,
        "location": fixture.location.uuid.to_string(),
        "startDate": "2024-01-01",
        "cohortType": fixture.cohort_type.uuid.to_string(),
    })
}

async fn create_cohort(server: &TestServer, body: Value) -> Value {
    let response = server
        .post(&format!("{}/cohortm/cohort", BASE))
        .json(&body)
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()
}

fn result_names(body: &Value) -> Vec<String> {
    body["results"]
        .as_array()
        .expect("results missing")
        .iter()
        .filter_map(|c| c["name"].as_str().map(str::to_string))
        .collect()
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let db = Database::open_memory().expect("Failed to create database");
        db.migrate().expect("Failed to migrate");
        let server = TestServer::new(create_router(db)).expect("Failed to create test server");

        let response = server.get(&format!("{}/health", BASE)).await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ok");
    }
}

mod reference_data {
    use super::*;

    #[tokio::test]
    async fn lists_created_locations_and_types() {
        let server = setup();
        let fixture = seed(&server).await;

        let locations = server
            .get(&format!("{}/location", BASE))
            .await
            .json::<Vec<Location>>();
        let types = server
            .get(&format!("{}/cohortm/cohorttype", BASE))
            .await
            .json::<Vec<CohortType>>();
        let attribute_types = server
            .get(&format!("{}/cohortm/cohortattributetype", BASE))
            .await
            .json::<Vec<CohortAttributeType>>();

        assert_eq!(locations, vec![fixture.location]);
        assert_eq!(types, vec![fixture.cohort_type]);
        assert_eq!(attribute_types, vec![fixture.village]);
    }
}

mod create_cohort {
    use super::*;

    #[tokio::test]
    async fn returns_default_representation() {
        let server = setup();
        let fixture = seed(&server).await;

        let cohort = create_cohort(&server, cohort_body(&fixture, "Youth Club")).await;

        assert_eq!(cohort["name"], "Youth Club");
        assert_eq!(cohort["display"], "Youth Club");
        assert_eq!(cohort["voided"], false);
        assert_eq!(cohort["location"]["uuid"], fixture.location.uuid.to_string());
        assert_eq!(cohort["cohortType"]["display"], "Community Group");
        assert!(cohort.get("cohortMembers").is_none());
    }

    #[tokio::test]
    async fn accepts_a_cohort_type_by_name() {
        let server = setup();
        let fixture = seed(&server).await;
        let mut body = cohort_body(&fixture, "Youth Club");
        body["cohortType"] = json!("Community Group");

        let cohort = create_cohort(&server, body).await;

        assert_eq!(cohort["cohortType"]["uuid"], fixture.cohort_type.uuid.to_string());
    }

    #[tokio::test]
    async fn rejects_missing_required_properties() {
        let server = setup();

        let response = server
            .post(&format!("{}/cohortm/cohort", BASE))
            .json(&json!({ "name": "Youth Club" }))
            .await;

        response.assert_status_bad_request();
        assert!(response.text().contains("Some required properties are missing"));
    }

    #[tokio::test]
    async fn rejects_unknown_properties() {
        let server = setup();
        let fixture = seed(&server).await;
        let mut body = cohort_body(&fixture, "Youth Club");
        body["auditInfo"] = json!({});

        let response = server
            .post(&format!("{}/cohortm/cohort", BASE))
            .json(&body)
            .await;

        response.assert_status_bad_request();
        assert!(response.text().contains("auditInfo"));
    }

    #[tokio::test]
    async fn rejects_an_unknown_location() {
        let server = setup();
        let fixture = seed(&server).await;
        let mut body = cohort_body(&fixture, "Youth Club");
        body["location"] = json!(Uuid::new_v4().to_string());

        let response = server
            .post(&format!("{}/cohortm/cohort", BASE))
            .json(&body)
            .await;

        response.assert_status_not_found();
        assert_eq!(response.text(), "No Location found for that uuid");
    }

    #[tokio::test]
    async fn rejects_an_attribute_uuid_from_another_cohort() {
        let server = setup();
        let fixture = seed(&server).await;
        let mut first = cohort_body(&fixture, "Youth Club");
        first["attributes"] = json!([
            { "attributeType": fixture.village.uuid.to_string(), "value": "x" }
        ]);
        let created = create_cohort(&server, first).await;
        let full = server
            .get(&format!("{}/cohortm/cohort/{}", BASE, created["uuid"].as_str().expect("uuid missing")))
            .add_query_param("v", "full")
            .await
            .json::<Value>();
        let taken = full["attributes"][0]["uuid"].clone();

        let mut second = cohort_body(&fixture, "Elders");
        second["attributes"] = json!([
            { "attributeType": fixture.village.uuid.to_string(), "value": "x", "uuid": taken }
        ]);
        let response = server
            .post(&format!("{}/cohortm/cohort", BASE))
            .json(&second)
            .await;

        response.assert_status_bad_request();
        assert!(response.text().contains("does not belong to this cohort"));
    }

    #[tokio::test]
    async fn stores_attributes_and_members() {
        let server = setup();
        let fixture = seed(&server).await;
        let mut body = cohort_body(&fixture, "Youth Club");
        body["attributes"] = json!([
            { "attributeType": fixture.village.uuid.to_string(), "value": "Kisumu" }
        ]);
        body["cohortMembers"] = json!([{ "patient": Uuid::new_v4().to_string() }]);

        let created = create_cohort(&server, body).await;
        let uuid = created["uuid"].as_str().expect("uuid missing");

        let full = server
            .get(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .add_query_param("v", "full")
            .await
            .json::<Value>();

        assert_eq!(full["attributes"][0]["value"], "Kisumu");
        assert_eq!(full["attributes"][0]["display"], "village: Kisumu");
        assert_eq!(full["cohortMembers"].as_array().map(Vec::len), Some(1));
        assert!(full["auditInfo"]["dateCreated"].is_string());
    }
}

mod get_cohort {
    use super::*;

    #[tokio::test]
    async fn returns_not_found_for_unknown_uuid() {
        let server = setup();

        let response = server
            .get(&format!("{}/cohortm/cohort/{}", BASE, Uuid::new_v4()))
            .await;

        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn rejects_unsupported_views() {
        let server = setup();
        let fixture = seed(&server).await;
        let created = create_cohort(&server, cohort_body(&fixture, "Youth Club")).await;
        let uuid = created["uuid"].as_str().expect("uuid missing");

        let response = server
            .get(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .add_query_param("v", "ref")
            .await;

        response.assert_status_bad_request();
        assert_eq!(response.text(), "Unsupported representation: ref");
    }
}

mod update_cohort {
    use super::*;

    #[tokio::test]
    async fn applies_a_partial_update() {
        let server = setup();
        let fixture = seed(&server).await;
        let created = create_cohort(&server, cohort_body(&fixture, "Youth Club")).await;
        let uuid = created["uuid"].as_str().expect("uuid missing");

        let response = server
            .post(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .json(&json!({ "description": "Saturday meetings" }))
            .await;

        response.assert_status_ok();
        let updated = response.json::<Value>();
        assert_eq!(updated["name"], "Youth Club");
        assert_eq!(updated["description"], "Saturday meetings");
    }

    #[tokio::test]
    async fn voiding_ends_memberships() {
        let server = setup();
        let fixture = seed(&server).await;
        let mut body = cohort_body(&fixture, "Youth Club");
        body["endDate"] = json!("2024-06-30");
        body["cohortMembers"] = json!([{ "patient": Uuid::new_v4().to_string() }]);
        let created = create_cohort(&server, body).await;
        let uuid = created["uuid"].as_str().expect("uuid missing");

        server
            .post(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .json(&json!({ "voided": true, "voidReason": "Program closed" }))
            .await
            .assert_status_ok();

        let full = server
            .get(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .add_query_param("v", "full")
            .await
            .json::<Value>();
        let member = &full["cohortMembers"][0];
        assert_eq!(member["voided"], true);
        assert_eq!(member["voidReason"], "Cohort Ended");
        assert_eq!(member["endDate"], full["endDate"]);
    }

    #[tokio::test]
    async fn returns_not_found_for_unknown_uuid() {
        let server = setup();

        let response = server
            .post(&format!("{}/cohortm/cohort/{}", BASE, Uuid::new_v4()))
            .json(&json!({ "description": "x" }))
            .await;

        response.assert_status_not_found();
    }
}

mod delete_cohort {
    use super::*;

    #[tokio::test]
    async fn voids_and_hides_from_list() {
        let server = setup();
        let fixture = seed(&server).await;
        let created = create_cohort(&server, cohort_body(&fixture, "Youth Club")).await;
        let uuid = created["uuid"].as_str().expect("uuid missing");

        server
            .delete(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .add_query_param("reason", "Duplicate")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let list = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .await
            .json::<Value>();
        assert!(result_names(&list).is_empty());

        let cohort = server
            .get(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .await
            .json::<Value>();
        assert_eq!(cohort["voided"], true);
        assert_eq!(cohort["voidReason"], "Duplicate");
    }

    #[tokio::test]
    async fn purge_removes_the_cohort() {
        let server = setup();
        let fixture = seed(&server).await;
        let created = create_cohort(&server, cohort_body(&fixture, "Youth Club")).await;
        let uuid = created["uuid"].as_str().expect("uuid missing");

        server
            .delete(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .add_query_param("purge", "true")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get(&format!("{}/cohortm/cohort/{}", BASE, uuid))
            .await
            .assert_status_not_found();
    }
}

mod search_cohorts {
    use super::*;

    async fn seed_cohorts(server: &TestServer) -> Fixture {
        let fixture = seed(server).await;
        let mut tagged = cohort_body(&fixture, "Youth Club");
        tagged["attributes"] = json!([
            { "attributeType": fixture.village.uuid.to_string(), "value": "1" }
        ]);
        create_cohort(server, tagged).await;
        create_cohort(server, cohort_body(&fixture, "Elders")).await;
        fixture
    }

    #[tokio::test]
    async fn lists_all_cohorts_by_name() {
        let server = setup();
        seed_cohorts(&server).await;

        let response = server.get(&format!("{}/cohortm/cohort", BASE)).await;

        response.assert_status_ok();
        assert_eq!(result_names(&response.json::<Value>()), vec!["Elders", "Youth Club"]);
    }

    #[tokio::test]
    async fn filters_by_attributes() {
        let server = setup();
        seed_cohorts(&server).await;

        let response = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .add_query_param("attributes", "village:1")
            .await;

        response.assert_status_ok();
        assert_eq!(result_names(&response.json::<Value>()), vec!["Youth Club"]);
    }

    #[tokio::test]
    async fn rejects_malformed_attributes() {
        let server = setup();
        seed_cohorts(&server).await;

        let response = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .add_query_param("attributes", "not json")
            .await;

        response.assert_status_bad_request();
        assert_eq!(response.text(), "Invalid format for parameter 'attributes'");
    }

    #[tokio::test]
    async fn returns_not_found_for_unknown_cohort_type() {
        let server = setup();
        seed_cohorts(&server).await;

        let response = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .add_query_param("cohortType", "Nope")
            .await;

        response.assert_status_not_found();
        assert_eq!(
            response.text(),
            "No Cohort Type By Name/Uuid Found Matching The Supplied Parameter"
        );
    }

    #[tokio::test]
    async fn location_returns_all_cohorts_there() {
        let server = setup();
        let fixture = seed_cohorts(&server).await;

        let response = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .add_query_param("location", fixture.location.uuid.to_string())
            .add_query_param("q", "no such cohort")
            .await;

        response.assert_status_ok();
        assert_eq!(result_names(&response.json::<Value>()), vec!["Elders", "Youth Club"]);
    }

    #[tokio::test]
    async fn pages_with_next_and_prev_links() {
        let server = setup_with(
            SecurityConfig::disabled(),
            PagingConfig {
                default_limit: 1,
                max_limit: 1,
            },
        );
        seed_cohorts(&server).await;

        let first = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .await
            .json::<Value>();
        assert_eq!(result_names(&first), vec!["Elders"]);
        assert_eq!(first["links"][0]["rel"], "next");
        assert_eq!(
            first["links"][0]["uri"],
            "/ws/rest/v1/cohortm/cohort?startIndex=1"
        );

        let second = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .add_query_param("startIndex", "1")
            .await
            .json::<Value>();
        assert_eq!(result_names(&second), vec!["Youth Club"]);
        assert_eq!(second["links"][0]["rel"], "prev");
    }
}

mod security_auth {
    use super::*;

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", token)).expect("valid header")
    }

    fn secured() -> TestServer {
        setup_with(SecurityConfig::with_api_key("test-key"), PagingConfig::default())
    }

    #[tokio::test]
    async fn health_is_public() {
        let server = secured();

        server
            .get(&format!("{}/health", BASE))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn anonymous_reads_are_unauthorized() {
        let server = secured();

        let response = server.get(&format!("{}/cohortm/cohort", BASE)).await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn anonymous_writes_are_unauthorized() {
        let server = secured();

        let response = server
            .post(&format!("{}/cohortm/cohort", BASE))
            .json(&json!({ "name": "Youth Club" }))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_key_is_unauthorized() {
        let server = secured();

        let response = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .add_header(header::AUTHORIZATION, bearer("wrong"))
            .await;

        response.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_key_is_accepted() {
        let server = secured();

        let response = server
            .get(&format!("{}/cohortm/cohort", BASE))
            .add_header(header::AUTHORIZATION, bearer("test-key"))
            .await;

        response.assert_status_ok();
        assert!(result_names(&response.json::<Value>()).is_empty());
    }
}
