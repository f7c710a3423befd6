use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use net_intercept::{NetworkChannel, Upstream};
use parking_lot::Mutex;
use query_engine::DocumentSource;
use serde_json::{json, Value};
use stub_spy::{Arg, MethodTable};
use tracing::{debug, info, warn};
use trellis_command_queue::{AppFactory, Application};
use trellis_core_types::{DomSnapshot, ElementId, EngineError, EngineResult, OutboundRequest};
use url::Url;

use crate::backend::FakeBackend;
use crate::config::SimConfig;
use crate::page::{self, find_by_cy};

const GEOLOCATION: &str = "navigator.geolocation";

enum ClickEffect {
    LoadMessages,
    Locate,
    OpenMenu,
    Select(String),
    Inert,
}

/// One running instance of the account page.
pub struct AccountApp {
    me: Weak<AccountApp>,
    config: SimConfig,
    dom: Mutex<DomSnapshot>,
    channel: NetworkChannel,
    geolocation: Arc<MethodTable>,
    visits: AtomicU64,
}

impl AccountApp {
    pub fn new(config: SimConfig, channel: NetworkChannel) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            config,
            dom: Mutex::new(DomSnapshot::new("body")),
            channel,
            geolocation: Arc::new(default_geolocation()),
            visits: AtomicU64::new(0),
        })
    }

    pub fn geolocation(&self) -> &Arc<MethodTable> {
        &self.geolocation
    }

    /// Replace the text of the element tagged `data-cy=cy`.
    fn show(&self, cy: &str, text: impl Into<String>) {
        let mut dom = self.dom.lock();
        if let Some(id) = find_by_cy(&dom, cy) {
            dom.set_text(id, text);
        }
    }

    fn load_messages(&self) {
        let Some(app) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let request = OutboundRequest::get(app.config.messages_url());
            let text = match app.channel.fetch(request).await {
                Ok(response) if response.is_success() => response
                    .body
                    .get("success")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| response.body.to_string()),
                Ok(response) => format!("Request failed with status {}", response.status_code),
                Err(err) => {
                    warn!(error = %err, "message request failed");
                    format!("Request failed: {err}")
                }
            };
            app.show(page::DATA_DISPLAY, text);
        });
    }

    fn request_location(&self) {
        let me = self.me.clone();
        let on_success = Arg::callback(move |args: &[Value]| {
            if let Some(app) = me.upgrade() {
                let position = args.first().cloned().unwrap_or(Value::Null);
                let coords = &position["coords"];
                app.show(
                    page::LOCATION_DISPLAY,
                    format!(
                        "Latitude: {}, Longitude: {}",
                        coords["latitude"], coords["longitude"]
                    ),
                );
            }
            Value::Null
        });
        let me = self.me.clone();
        let on_error = Arg::callback(move |args: &[Value]| {
            if let Some(app) = me.upgrade() {
                let message = args
                    .first()
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                app.show(
                    page::LOCATION_DISPLAY,
                    format!("Location unavailable: {message}"),
                );
            }
            Value::Null
        });
        if let Err(err) = self
            .geolocation
            .invoke("getCurrentPosition", &[on_success, on_error])
        {
            warn!(error = %err, "geolocation lookup failed");
            self.show(page::LOCATION_DISPLAY, format!("Location unavailable: {err}"));
        }
    }

    fn classify(&self, element: ElementId) -> EngineResult<ClickEffect> {
        let dom = self.dom.lock();
        let node = dom
            .node(element)
            .ok_or_else(|| EngineError::Detached(format!("{element} is not in the page")))?;
        if node.is_disabled() {
            return Err(EngineError::NotActionable(format!(
                "{} is disabled",
                node.describe()
            )));
        }
        let cy = page::closest_cy(&dom, element).map(|(_, cy)| cy);
        let effect = match (cy.as_deref(), node.tag.as_str()) {
            (Some(page::GET_REAL_DATA | page::GET_INTERCEPTED_DATA), _) => ClickEffect::LoadMessages,
            (Some(page::GET_LOCATION), _) => ClickEffect::Locate,
            (Some(page::DROPDOWN), "button") => ClickEffect::OpenMenu,
            (Some(page::DROPDOWN_MENU), "a") => ClickEffect::Select(dom.text_content(element)),
            _ => ClickEffect::Inert,
        };
        Ok(effect)
    }

    fn render(&self, url: &str, generation: u64) {
        if self.visits.load(Ordering::SeqCst) == generation {
            *self.dom.lock() = page::account_page(url);
            debug!(url, "account page rendered");
        }
    }
}

/// Stand-in for the browser's geolocation object: always denies.
fn default_geolocation() -> MethodTable {
    MethodTable::new(GEOLOCATION).with_method("getCurrentPosition", |args| {
        if let Some(on_error) = args.get(1).and_then(Arg::as_callback) {
            on_error(&[json!({ "code": 1, "message": "User denied Geolocation" })]);
        }
        Ok(Value::Null)
    })
}

impl DocumentSource for AccountApp {
    fn snapshot(&self) -> DomSnapshot {
        self.dom.lock().clone()
    }
}

#[async_trait]
impl Application for AccountApp {
    async fn visit(&self, url: &str) -> EngineResult<()> {
        let path = Url::parse(url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| url.to_string());
        let generation = self.visits.fetch_add(1, Ordering::SeqCst) + 1;
        info!(url, "visiting");

        if path != "/account" {
            *self.dom.lock() = page::not_found_page(url);
            return Err(EngineError::Application(format!(
                "visit {url} failed: 404 page not found"
            )));
        }

        let mut blank = DomSnapshot::new("body");
        blank.url = Some(url.to_string());
        *self.dom.lock() = blank;

        let delay = Duration::from_millis(self.config.render_delay_ms);
        match self.me.upgrade() {
            Some(app) if !delay.is_zero() => {
                let url = url.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    app.render(&url, generation);
                });
            }
            _ => self.render(url, generation),
        }
        Ok(())
    }

    async fn click(&self, element: ElementId) -> EngineResult<()> {
        match self.classify(element)? {
            ClickEffect::LoadMessages => self.load_messages(),
            ClickEffect::Locate => self.request_location(),
            ClickEffect::OpenMenu => {
                page::open_menu(&mut self.dom.lock());
            }
            ClickEffect::Select(entry) => {
                self.show(page::SELECTION, format!("Selected: {entry}"));
            }
            ClickEffect::Inert => debug!(%element, "click had no effect"),
        }
        Ok(())
    }

    async fn type_text(&self, element: ElementId, text: &str) -> EngineResult<()> {
        let mut dom = self.dom.lock();
        let tag = dom
            .node(element)
            .map(|n| n.tag.clone())
            .ok_or_else(|| EngineError::Detached(format!("{element} is not in the page")))?;
        if tag != "input" && tag != "textarea" {
            return Err(EngineError::NotActionable(format!(
                "<{tag}> cannot be typed into"
            )));
        }
        dom.set_attr(element, "value", text);
        Ok(())
    }

    fn platform_object(&self, path: &str) -> EngineResult<Arc<MethodTable>> {
        match path.trim_start_matches("window.") {
            GEOLOCATION => Ok(self.geolocation.clone()),
            other => Err(EngineError::Application(format!(
                "no platform object named `{other}`"
            ))),
        }
    }
}

/// Launches a fresh [`AccountApp`] per test case.
pub struct SimFactory {
    config: SimConfig,
    backend: Arc<FakeBackend>,
    latest: Mutex<Weak<AccountApp>>,
}

impl SimFactory {
    pub fn new(config: SimConfig) -> Self {
        let backend = Arc::new(FakeBackend::new(Duration::from_millis(config.api_latency_ms)));
        Self {
            config,
            backend,
            latest: Mutex::new(Weak::new()),
        }
    }

    /// Most recently launched app, while some test still holds it.
    pub fn latest(&self) -> Option<Arc<AccountApp>> {
        self.latest.lock().upgrade()
    }
}

impl Default for SimFactory {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

#[async_trait]
impl AppFactory for SimFactory {
    fn name(&self) -> &str {
        "account-sim"
    }

    fn upstream(&self) -> Arc<dyn Upstream> {
        self.backend.clone()
    }

    async fn launch(&self, channel: NetworkChannel) -> EngineResult<Arc<dyn Application>> {
        let app = AccountApp::new(self.config.clone(), channel);
        *self.latest.lock() = Arc::downgrade(&app);
        Ok(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use net_intercept::InterceptLayer;
    use stub_spy::{StubBehavior, StubRegistry};

    fn launch() -> Arc<AccountApp> {
        let config = SimConfig {
            render_delay_ms: 0,
            api_latency_ms: 0,
            ..SimConfig::default()
        };
        let channel = NetworkChannel::new(
            Arc::new(InterceptLayer::new()),
            Arc::new(FakeBackend::new(Duration::ZERO)),
        );
        AccountApp::new(config, channel)
    }

    fn text_of(app: &AccountApp, cy: &str) -> String {
        let dom = app.snapshot();
        find_by_cy(&dom, cy)
            .map(|id| dom.text_content(id))
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn dropdown_selection_is_displayed() {
        let app = launch();
        app.visit("http://localhost:3000/account").await.unwrap();
        let dom = app.snapshot();
        let dropdown = find_by_cy(&dom, page::DROPDOWN).unwrap();
        let toggle = dom.descendants(dropdown)[0];
        app.click(toggle).await.unwrap();

        let dom = app.snapshot();
        let menu = find_by_cy(&dom, page::DROPDOWN_MENU).unwrap();
        let license = *dom.descendants(menu).last().unwrap();
        app.click(license).await.unwrap();
        assert_eq!(text_of(&app, page::SELECTION), "Selected: License");
    }

    #[tokio::test]
    async fn disabled_button_rejects_clicks() {
        let app = launch();
        app.visit("http://localhost:3000/account").await.unwrap();
        let dom = app.snapshot();
        let disabled = find_by_cy(&dom, page::NOT_ACTIVE).unwrap();
        assert!(matches!(
            app.click(disabled).await,
            Err(EngineError::NotActionable(_))
        ));
    }

    #[tokio::test]
    async fn location_uses_the_geolocation_table() {
        let app = launch();
        app.visit("http://localhost:3000/account").await.unwrap();
        let button = find_by_cy(&app.snapshot(), page::GET_LOCATION).unwrap();

        app.click(button).await.unwrap();
        assert_eq!(
            text_of(&app, page::LOCATION_DISPLAY),
            "Location unavailable: User denied Geolocation"
        );

        let stubs = StubRegistry::new();
        let table = app.platform_object("window.navigator.geolocation").unwrap();
        stubs
            .stub(
                &table,
                "getCurrentPosition",
                StubBehavior::calls_fake(|args| {
                    if let Some(success) = args.first().and_then(Arg::as_callback) {
                        success(&[json!({ "coords": { "latitude": 1.5, "longitude": 2.5 } })]);
                    }
                    Ok(Value::Null)
                }),
            )
            .unwrap();
        app.click(button).await.unwrap();
        assert_eq!(
            text_of(&app, page::LOCATION_DISPLAY),
            "Latitude: 1.5, Longitude: 2.5"
        );
    }

    #[tokio::test]
    async fn unknown_pages_fail_to_visit() {
        let app = launch();
        assert!(matches!(
            app.visit("http://localhost:3000/nowhere").await,
            Err(EngineError::Application(_))
        ));
    }
}
