//! Integration tests for the installation wizard and calendar webhook.
//!
//! Each test spins up the full router on a random port backed by an
//! in-memory database and talks to it over real HTTP with redirects
//! disabled, so `Location` headers can be asserted directly.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::LOCATION;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;

use install_flow::calendar::{AvailabilityCache, BusyInterval, CalendarProvider, CalendarWebhook};
use install_flow::config::RedirectPaths;
use install_flow::error::CalendarError;
use install_flow::server::build_router;
use install_flow::store::{
    App, CalendarSubscription, Credential, Database, EventType, LibSqlBackend, Membership,
    MembershipRole, SelectedCalendar, Team, User,
};
use install_flow::wizard::{HeaderSession, WizardRouteState};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const WEBHOOK_PATH: &str = "/api/integrations/googlecalendar/webhook";
const SECRET: &str = "channel-secret";

/// Provider returning one busy hour at the start of the window.
struct StubProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl CalendarProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch_availability(
        &self,
        _credential: &Credential,
        date_from: DateTime<Utc>,
        _date_to: DateTime<Utc>,
        _calendars: &[SelectedCalendar],
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![BusyInterval {
            start: date_from,
            end: date_from + chrono::Duration::hours(1),
        }])
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    db: Arc<LibSqlBackend>,
    provider: Arc<StubProvider>,
}

impl TestServer {
    async fn get(&self, path: &str, user: Option<i64>) -> reqwest::Response {
        let mut request = self.client.get(format!("{}{path}", self.base));
        if let Some(user) = user {
            request = request.header("x-user-id", user.to_string());
        }
        request.send().await.expect("request failed")
    }

    async fn notify(&self, token: Option<&str>, channel: Option<&str>) -> reqwest::Response {
        let mut request = self.client.post(format!("{}{WEBHOOK_PATH}", self.base));
        if let Some(token) = token {
            request = request.header("X-Goog-Channel-Token", token);
        }
        if let Some(channel) = channel {
            request = request.header("X-Goog-Channel-ID", channel);
        }
        request.send().await.expect("request failed")
    }
}

fn location(response: &reqwest::Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

/// Users:
/// - 1: solo, no teams, has personal event types
/// - 2: member of team 10 (which has one event type) and team 20 (none)
async fn seed(db: &LibSqlBackend) {
    for (id, name) in [(1, "Solo"), (2, "Teamer")] {
        db.insert_user(&User {
            id,
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
        })
        .await
        .unwrap();
    }
    db.insert_app(&App {
        slug: "zoom".into(),
        name: "Zoom".into(),
        logo_url: Some("/logos/zoom.svg".into()),
        enabled: true,
        is_oauth: false,
    })
    .await
    .unwrap();
    db.insert_app(&App {
        slug: "google-meet".into(),
        name: "Google Meet".into(),
        logo_url: None,
        enabled: true,
        is_oauth: true,
    })
    .await
    .unwrap();
    db.insert_app(&App {
        slug: "retired".into(),
        name: "Retired".into(),
        logo_url: None,
        enabled: false,
        is_oauth: false,
    })
    .await
    .unwrap();

    for (id, slug) in [(10, "sales"), (20, "empty")] {
        db.insert_team(&Team {
            id,
            name: slug.to_uppercase(),
            slug: slug.into(),
            logo_url: None,
        })
        .await
        .unwrap();
        db.insert_membership(&Membership {
            user_id: 2,
            team_id: id,
            accepted: true,
            role: MembershipRole::Member,
        })
        .await
        .unwrap();
    }

    let event_types = [
        (1, "Quick chat", 15, 0, Some(1), None),
        (2, "Deep dive", 60, 5, Some(1), None),
        (3, "Sales demo", 30, 0, None, Some(10)),
    ];
    for (id, title, length_minutes, position, user_id, team_id) in event_types {
        db.insert_event_type(&EventType {
            id,
            title: title.into(),
            slug: title.to_lowercase().replace(' ', "-"),
            length_minutes,
            position,
            user_id,
            team_id,
        })
        .await
        .unwrap();
    }

    db.insert_credential(&Credential {
        id: 100,
        kind: "google_calendar".into(),
        app_slug: "google-calendar".into(),
        user_id: Some(1),
        team_id: None,
        key: serde_json::json!({"access_token": "token"}),
    })
    .await
    .unwrap();
    db.insert_selected_calendar(&SelectedCalendar {
        user_id: 1,
        credential_id: Some(100),
        integration: "google_calendar".into(),
        external_id: "primary".into(),
    })
    .await
    .unwrap();
    db.insert_subscription(&CalendarSubscription {
        id: 1,
        channel_id: "channel-100".into(),
        credential_id: Some(100),
        expires_at: None,
    })
    .await
    .unwrap();
}

/// Start the full router on a random port.
async fn start_server() -> TestServer {
    let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    seed(&db).await;

    let provider = Arc::new(StubProvider {
        calls: AtomicUsize::new(0),
    });
    let cache = Arc::new(AvailabilityCache::new(
        db.clone(),
        provider.clone(),
        Duration::from_secs(3600),
    ));
    let webhook = Arc::new(CalendarWebhook::new(
        db.clone(),
        cache,
        Some(secrecy::SecretString::from(SECRET.to_string())),
    ));
    let wizard = WizardRouteState {
        db: db.clone(),
        session: Arc::new(HeaderSession::new("x-user-id").unwrap()),
        redirects: RedirectPaths::default(),
    };
    let app = build_router(wizard, webhook);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        client,
        db,
        provider,
    }
}

// ── Wizard ───────────────────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_visitor_goes_to_login() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server.get("/apps/installation/event-types?slug=zoom", None).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/auth/login");

        let response = server.get("/apps/installation/event-types?slug=zoom", Some(999)).await;
        assert_eq!(location(&response), "/auth/login");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn accounts_step_without_teams_redirects_to_first_step() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let response = server.get("/apps/installation/accounts?slug=zoom", Some(1)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/apps/installation/event-types?slug=zoom");

        let response = server
            .get("/apps/installation/accounts?slug=google-meet", Some(1))
            .await;
        assert_eq!(location(&response), "/apps/installation/connect?slug=google-meet");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn connect_step_on_non_oauth_app_goes_to_catalog() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server.get("/apps/installation/connect?slug=zoom", Some(2)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/apps");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_disabled_or_malformed_input_goes_to_catalog() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        for path in [
            "/apps/installation/payment?slug=zoom",
            "/apps/installation/accounts?slug=nope",
            "/apps/installation/accounts?slug=retired",
            "/apps/installation/accounts",
            "/apps/installation/event-types?slug=zoom&teamId=ten",
        ] {
            let response = server.get(path, Some(2)).await;
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT, "{path}");
            assert_eq!(location(&response), "/apps", "{path}");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn team_outside_memberships_goes_to_catalog() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server
            .get("/apps/installation/event-types?slug=zoom&teamId=10", Some(1))
            .await;
        assert_eq!(location(&response), "/apps");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn empty_event_types_goes_to_installed_apps() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server
            .get("/apps/installation/event-types?slug=zoom&teamId=20", Some(2))
            .await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(location(&response), "/apps/installed");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn event_types_step_renders_sorted_candidates() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server
            .get("/apps/installation/event-types?slug=zoom", Some(1))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["step"]["step"], "event-types");
        assert_eq!(json["step"]["title"], "Select Event Type");
        assert_eq!(json["step"]["ordinal"], 0);
        assert_eq!(json["step"]["total_steps"], 1);
        assert_eq!(json["app"]["name"], "Zoom");

        let titles: Vec<&str> = json["event_types"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, ["Deep dive", "Quick chat"]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn team_member_sees_team_event_types() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server
            .get("/apps/installation/event-types?slug=zoom&teamId=10", Some(2))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = response.json().await.unwrap();
        assert_eq!(json["team_id"], 10);
        assert_eq!(json["step"]["ordinal"], 1);
        assert_eq!(json["step"]["total_steps"], 2);
        assert_eq!(json["event_types"][0]["title"], "Sales demo");
    })
    .await
    .expect("test timed out");
}

// ── Webhook ──────────────────────────────────────────────────────────

#[tokio::test]
async fn webhook_rejects_bad_token() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        for token in [None, Some("guess")] {
            let response = server.notify(token, Some("channel-100")).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        assert_eq!(server.provider.calls.load(Ordering::SeqCst), 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn webhook_unknown_channel_is_not_found() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server.notify(Some(SECRET), Some("channel-404")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json: Value = response.json().await.unwrap();
        assert!(json["message"].as_str().unwrap().contains("channel-404"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn webhook_refreshes_cache_idempotently() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        for _ in 0..2 {
            let response = server.notify(Some(SECRET), Some("channel-100")).await;
            assert_eq!(response.status(), StatusCode::OK);
            let json: Value = response.json().await.unwrap();
            assert_eq!(json["message"], "ok");
        }
        assert_eq!(server.provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(server.db.count_calendar_cache(100).await.unwrap(), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let response = server.get("/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: Value = response.json().await.unwrap();
        assert_eq!(json["status"], "ok");
    })
    .await
    .expect("test timed out");
}
