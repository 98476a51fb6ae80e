const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
const NAVIGATION_GRACE: Duration = Duration::from_secs(5);
const SCROLL_STEP_PX: i64 = 300;
const BOTTOM_SLACK_PX: f64 = 100.0;
const READING_PAUSE_MS: (u64, u64) = (5_000, 15_000);
const BEHAVIOR_PROBABILITY: f64 = 0.7;
const BEHAVIOR_PAUSE_MS: (u64, u64) = (1_000, 3_000);
const SIDE_TAB_DELAY_MS: (u64, u64) = (1_000, 3_000);
const RESTART_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_SCROLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_MAX_OPEN_PAGES: usize = 5;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sitewalk",
    version,
    about = "Wander a site's link graph in a real browser, paced like a human reader"
)]
struct Cli {
    #[arg(value_name = "URL")]
    urls: Vec<String>,

    #[arg(long, value_name = "FILE")]
    urls_file: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    save_urls: bool,

    #[arg(long, value_name = "SECS", default_value_t = 10)]
    duration: u64,

    #[arg(long, value_name = "MS", default_value_t = DEFAULT_SCROLL_INTERVAL_MS)]
    scroll_interval_ms: u64,

    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_OPEN_PAGES)]
    max_pages: usize,

    #[arg(long, value_name = "N", default_value_t = 0)]
    tabs_per_visit: usize,

    #[arg(long, value_name = "DIR")]
    profile_dir: Option<PathBuf>,

    #[arg(long, value_name = "URL", default_value = "http://localhost:9515")]
    webdriver_url: String,

    #[arg(long, default_value_t = false)]
    no_webdriver_autostart: bool,

    #[arg(long, value_name = "PATH")]
    webdriver_binary: Option<String>,

    #[arg(long, value_name = "MS", default_value_t = 12000)]
    webdriver_start_timeout_ms: u64,

    #[arg(long, value_name = "N")]
    seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Link {
    href: String,
    text: String,
    #[serde(default)]
    title: String,
}

impl Link {
    fn new(href: impl Into<String>) -> Self {
        let href = href.into();
        Link {
            text: href.clone(),
            href,
            title: String::new(),
        }
    }

    fn with_text(mut self, text: &str) -> Self {
        let text = text.trim();
        if !text.is_empty() {
            self.text = text.to_string();
        }
        self
    }

    fn with_title(mut self, title: &str) -> Self {
        self.title = title.trim().to_string();
        self
    }

    fn from_anchor(anchor: RawAnchor) -> Option<Self> {
        if !is_crawlable_href(&anchor.href) {
            return None;
        }
        Some(
            Link::new(anchor.href)
                .with_text(&anchor.text)
                .with_title(&anchor.title),
        )
    }

    fn outranks(&self, other: &Link) -> bool {
        let (mine, theirs) = (self.text.chars().count(), other.text.chars().count());
        mine > theirs || (mine == theirs && !self.title.is_empty() && other.title.is_empty())
    }

    fn absorb(&mut self, other: &Link) {
        if other.text.chars().count() > self.text.chars().count() {
            self.text = other.text.clone();
        }
        if self.title.is_empty() && !other.title.is_empty() {
            self.title = other.title.clone();
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawAnchor {
    #[serde(default)]
    href: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    title: String,
}

fn is_crawlable_href(href: &str) -> bool {
    let lower = href.trim().to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return false;
    }
    if lower.contains('#')
        || lower.contains("javascript:")
        || lower.contains("mailto:")
        || lower.contains("tel:")
    {
        return false;
    }
    Url::parse(href.trim()).is_ok()
}

#[derive(Debug, Clone, PartialEq)]
struct EngineConfig {
    seed_urls: Vec<String>,
    visit_duration: Duration,
    scroll_interval: Duration,
    max_open_pages: usize,
    tabs_per_visit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            seed_urls: Vec::new(),
            visit_duration: Duration::from_secs(10),
            scroll_interval: Duration::from_millis(DEFAULT_SCROLL_INTERVAL_MS),
            max_open_pages: DEFAULT_MAX_OPEN_PAGES,
            tabs_per_visit: 0,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), EngineError> {
        if self.seed_urls.iter().all(|url| url.trim().is_empty()) {
            return Err(EngineError::Config("no seed URLs configured".to_string()));
        }
        Ok(())
    }
}

impl From<&Cli> for StartRequest {
    fn from(cli: &Cli) -> Self {
        StartRequest {
            urls: cli.urls.clone(),
            duration: cli.duration,
            scroll_interval: Some(cli.scroll_interval_ms),
            max_pages: Some(cli.max_pages),
            tabs_per_visit: Some(cli.tabs_per_visit),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRequest {
    urls: Vec<String>,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    scroll_interval: Option<u64>,
    #[serde(default)]
    max_pages: Option<usize>,
    #[serde(default)]
    tabs_per_visit: Option<usize>,
}

impl From<StartRequest> for EngineConfig {
    fn from(request: StartRequest) -> Self {
        let scroll_interval_ms = request
            .scroll_interval
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_SCROLL_INTERVAL_MS);
        let max_open_pages = request
            .max_pages
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_OPEN_PAGES);
        EngineConfig {
            seed_urls: request
                .urls
                .into_iter()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty())
                .collect(),
            visit_duration: Duration::from_secs(request.duration),
            scroll_interval: Duration::from_millis(scroll_interval_ms),
            max_open_pages,
            tabs_per_visit: request.tabs_per_visit.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct AutomationResponse {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl AutomationResponse {
    fn ok() -> Self {
        AutomationResponse {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        AutomationResponse {
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct UrlListResponse {
    success: bool,
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum VisitOutcome {
    Ok,
    Timeout,
    Blocked,
    ScriptError,
}

impl VisitOutcome {
    fn label(self) -> &'static str {
        match self {
            VisitOutcome::Ok => "ok",
            VisitOutcome::Timeout => "timeout",
            VisitOutcome::Blocked => "blocked",
            VisitOutcome::ScriptError => "script_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Seeded,
    Visiting,
    Extracting,
    Simulating,
    Exhausted,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Exhausted,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct SessionStats {
    visits: usize,
    ok: usize,
    timeouts: usize,
    blocked: usize,
    script_errors: usize,
    links_discovered: usize,
    side_tabs: usize,
    behavior_runs: usize,
}

impl SessionStats {
    fn record(&mut self, outcome: VisitOutcome) {
        self.visits += 1;
        match outcome {
            VisitOutcome::Ok => self.ok += 1,
            VisitOutcome::Timeout => self.timeouts += 1,
            VisitOutcome::Blocked => self.blocked += 1,
            VisitOutcome::ScriptError => self.script_errors += 1,
        }
    }

    fn absorb(&mut self, other: &SessionStats) {
        self.visits += other.visits;
        self.ok += other.ok;
        self.timeouts += other.timeouts;
        self.blocked += other.blocked;
        self.script_errors += other.script_errors;
        self.links_discovered += other.links_discovered;
        self.side_tabs += other.side_tabs;
        self.behavior_runs += other.behavior_runs;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionReport {
    restart: bool,
    end: SessionEnd,
    stats: SessionStats,
    started_at: String,
    finished_at: String,
}

#[derive(Debug)]
enum EngineEvent {
    SessionStarted {
        cycle: usize,
        seeds: usize,
    },
    Visited {
        href: String,
        outcome: VisitOutcome,
        discovered: usize,
    },
    SessionEnded {
        cycle: usize,
        report: SessionReport,
    },
    Completed(AutomationResponse),
}

#[derive(Debug, thiserror::Error)]
enum DriverError {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("script failed: {0}")]
    Script(String),
    #[error("webdriver protocol error: {0}")]
    Protocol(String),
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("webdriver transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Launch(#[from] DriverError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

fn send_event(events: Option<&UnboundedSender<EngineEvent>>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn link_text_falls_back_to_href() {
        let link = Link::new("https://a.test/x").with_text("   ");
        assert_eq!(link.text, "https://a.test/x");
        assert!(link.title.is_empty());
    }

    #[test]
    fn crawlable_href_filter() {
        assert!(is_crawlable_href("https://b/page"));
        assert!(is_crawlable_href("http://example.com/a?b=c"));
        assert!(!is_crawlable_href("https://a/#frag"));
        assert!(!is_crawlable_href("javascript:void(0)"));
        assert!(!is_crawlable_href("mailto:x@y.com"));
        assert!(!is_crawlable_href("tel:123"));
        assert!(!is_crawlable_href("/relative/path"));
        assert!(!is_crawlable_href("ftp://files.example.com"));
    }

    #[test]
    fn longer_text_outranks_and_title_breaks_ties() {
        let short = Link::new("https://a/").with_text("A");
        let long = Link::new("https://a/").with_text("A longer description");
        assert!(long.outranks(&short));
        assert!(!short.outranks(&long));

        let bare = Link::new("https://a/").with_text("x");
        let titled = Link::new("https://a/").with_text("x").with_title("T");
        assert!(titled.outranks(&bare));
        assert!(!bare.outranks(&titled));
    }

    #[test]
    fn start_request_applies_defaults() {
        let request: StartRequest = serde_json::from_value(json!({
            "urls": [" https://a.test ", ""],
            "duration": 3,
            "scrollInterval": 0
        }))
        .unwrap();
        let config = EngineConfig::from(request);
        assert_eq!(config.seed_urls, vec!["https://a.test".to_string()]);
        assert_eq!(config.visit_duration, Duration::from_secs(3));
        assert_eq!(config.scroll_interval, Duration::from_millis(1000));
        assert_eq!(config.max_open_pages, 5);
        assert_eq!(config.tabs_per_visit, 0);
        assert!(config.validate().is_ok());
        assert!(EngineConfig::default().validate().is_err());
    }

    #[test]
    fn cli_flags_become_a_start_request() {
        let cli = Cli::parse_from(["sitewalk", "https://a.test/", "--duration", "4", "--max-pages", "0"]);
        let config = EngineConfig::from(StartRequest::from(&cli));
        assert_eq!(config.seed_urls, vec!["https://a.test/".to_string()]);
        assert_eq!(config.visit_duration, Duration::from_secs(4));
        assert_eq!(config.max_open_pages, DEFAULT_MAX_OPEN_PAGES);
        assert_eq!(cli.webdriver_url, "http://localhost:9515");
    }

    #[test]
    fn responses_serialize_to_control_shapes() {
        assert_eq!(
            serde_json::to_value(AutomationResponse::ok()).unwrap(),
            json!({ "success": true })
        );
        assert_eq!(
            serde_json::to_value(AutomationResponse::failed("boom")).unwrap(),
            json!({ "success": false, "error": "boom" })
        );
    }
}
