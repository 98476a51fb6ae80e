#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageId(String);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// Closing a page must leave the context usable.
#[async_trait]
trait BrowserContext: Send {
    async fn open_page(&mut self) -> Result<PageId, DriverError>;

    async fn navigate(&mut self, page: &PageId, url: &str, timeout: Duration) -> Result<(), DriverError>;

    async fn evaluate(&mut self, page: &PageId, script: &str, args: Value) -> Result<Value, DriverError>;

    async fn scroll_by(&mut self, page: &PageId, dy: i64) -> Result<(), DriverError>;

    async fn move_pointer(&mut self, page: &PageId, x: f64, y: f64) -> Result<(), DriverError>;

    async fn wait(&mut self, page: &PageId, duration: Duration);

    async fn close_page(&mut self, page: &PageId) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

#[async_trait]
trait BrowserLauncher: Send + Sync {
    type Context: BrowserContext;

    async fn launch(&self, profile_dir: &Path) -> Result<Self::Context, DriverError>;
}

struct WebDriverLauncher {
    endpoint: String,
    autostart: bool,
    driver_binary: String,
    start_timeout: Duration,
    client: reqwest::Client,
    child: Mutex<Option<Child>>,
}

impl WebDriverLauncher {
    fn new(cli: &Cli) -> Result<Self, DriverError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(40))
            .build()?;
        Ok(WebDriverLauncher {
            endpoint: normalize_local_webdriver_endpoint(&cli.webdriver_url),
            autostart: !cli.no_webdriver_autostart,
            driver_binary: cli
                .webdriver_binary
                .clone()
                .unwrap_or_else(|| "chromedriver".to_string()),
            start_timeout: Duration::from_millis(cli.webdriver_start_timeout_ms),
            client,
            child: Mutex::new(None),
        })
    }

    async fn ensure_webdriver_ready(&self) -> Result<(), DriverError> {
        if webdriver_reachable(&self.endpoint) {
            return Ok(());
        }
        if !self.autostart {
            return Err(DriverError::Launch(format!(
                "endpoint {} unreachable and --no-webdriver-autostart is set",
                self.endpoint
            )));
        }
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut stale) = guard.take() {
                let _ = stale.kill();
                let _ = stale.wait();
            }
        }
        let child = start_webdriver(&self.driver_binary, &self.endpoint, self.start_timeout).await?;
        info!(endpoint = %self.endpoint, "webdriver autostarted");
        if let Ok(mut guard) = self.child.lock() {
            *guard = Some(child);
        }
        Ok(())
    }
}

impl Drop for WebDriverLauncher {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    type Context = WebDriverContext;

    async fn launch(&self, profile_dir: &Path) -> Result<WebDriverContext, DriverError> {
        self.ensure_webdriver_ready().await?;
        let base = self.endpoint.trim_end_matches('/').to_string();
        let caps = webdriver_capabilities(profile_dir);
        let value = webdriver_command(&self.client, Method::POST, &format!("{base}/session"), Some(caps))
            .await
            .map_err(|e| DriverError::Launch(format!("session create failed: {e}")))?;
        let session_id = value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| DriverError::Launch("session id missing in response".to_string()))?;
        let session = format!("{base}/session/{session_id}");
        let home = webdriver_command(&self.client, Method::GET, &format!("{session}/window"), None)
            .await?
            .as_str()
            .map(|h| PageId(h.to_string()))
            .ok_or_else(|| DriverError::Launch("initial window handle missing".to_string()))?;
        info!(session = %session_id, profile = %profile_dir.display(), "browser session created");
        Ok(WebDriverContext {
            client: self.client.clone(),
            base: session,
            current: Some(home.clone()),
            home,
            page_load: NAVIGATION_TIMEOUT,
        })
    }
}

// `home` is the session's initial tab. It is never pooled, so there is always
// a live window to return to after closing a pooled one.
struct WebDriverContext {
    client: reqwest::Client,
    base: String,
    current: Option<PageId>,
    home: PageId,
    page_load: Duration,
}

impl WebDriverContext {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, DriverError> {
        webdriver_command(&self.client, method, &format!("{}{path}", self.base), body).await
    }

    async fn focus(&mut self, page: &PageId) -> Result<(), DriverError> {
        if self.current.as_ref() == Some(page) {
            return Ok(());
        }
        self.command(Method::POST, "/window", Some(json!({ "handle": page.0 })))
            .await?;
        self.current = Some(page.clone());
        Ok(())
    }

    async fn focus_home(&mut self) -> Result<(), DriverError> {
        let home = self.home.clone();
        self.focus(&home).await
    }

    async fn execute(&mut self, page: &PageId, script: &str, args: Value) -> Result<Value, DriverError> {
        self.focus(page).await?;
        self.command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }
}

#[async_trait]
impl BrowserContext for WebDriverContext {
    async fn open_page(&mut self) -> Result<PageId, DriverError> {
        if self.current.is_none() {
            self.focus_home().await?;
        }
        let value = self
            .command(Method::POST, "/window/new", Some(json!({ "type": "tab" })))
            .await?;
        let handle = value
            .get("handle")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DriverError::Protocol("new window response without handle".to_string()))?;
        Ok(PageId(handle.to_string()))
    }

    async fn navigate(&mut self, page: &PageId, url: &str, timeout: Duration) -> Result<(), DriverError> {
        self.focus(page).await?;
        if self.page_load != timeout {
            self.command(
                Method::POST,
                "/timeouts",
                Some(json!({ "pageLoad": timeout.as_millis() as u64 })),
            )
            .await?;
            self.page_load = timeout;
        }
        // The server aborts the load at `timeout`; the client bound is a backstop.
        let request = self.command(Method::POST, "/url", Some(json!({ "url": url })));
        match tokio::time::timeout(timeout + NAVIGATION_GRACE, request).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(DriverError::Timeout(format!(
                "navigation to {url} exceeded {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn evaluate(&mut self, page: &PageId, script: &str, args: Value) -> Result<Value, DriverError> {
        self.execute(page, script, args).await
    }

    async fn scroll_by(&mut self, page: &PageId, dy: i64) -> Result<(), DriverError> {
        self.execute(page, "window.scrollBy(0, arguments[0]);", json!([dy]))
            .await
            .map(|_| ())
    }

    async fn move_pointer(&mut self, page: &PageId, x: f64, y: f64) -> Result<(), DriverError> {
        self.focus(page).await?;
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "mouse",
                "parameters": { "pointerType": "mouse" },
                "actions": [{
                    "type": "pointerMove",
                    "duration": 250,
                    "origin": "viewport",
                    "x": x.round().max(0.0) as i64,
                    "y": y.round().max(0.0) as i64
                }]
            }]
        });
        self.command(Method::POST, "/actions", Some(actions)).await.map(|_| ())
    }

    async fn wait(&mut self, _page: &PageId, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn close_page(&mut self, page: &PageId) -> Result<(), DriverError> {
        self.focus(page).await?;
        let closed = self.command(Method::DELETE, "/window", None).await;
        self.current = None;
        self.focus_home().await?;
        closed.map(|_| ())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.current = None;
        self.command(Method::DELETE, "", None).await.map(|_| ())
    }
}

async fn webdriver_command(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let res = request.send().await?;
    let status = res.status();
    let text = res.text().await?;
    let value: Value = serde_json::from_str(&text).unwrap_or_default();
    if let Some(err) = value.pointer("/value/error").and_then(|v| v.as_str()) {
        let message = value
            .pointer("/value/message")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown webdriver error");
        return Err(webdriver_error(err, message));
    }
    if !status.is_success() {
        return Err(DriverError::Protocol(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate_for_log(&text, 240)
        )));
    }
    Ok(value.get("value").cloned().unwrap_or(Value::Null))
}

fn webdriver_error(name: &str, message: &str) -> DriverError {
    let detail = format!("{name}: {}", truncate_for_log(message, 240));
    match name {
        "timeout" | "script timeout" => DriverError::Timeout(detail),
        "javascript error" => DriverError::Script(detail),
        _ => DriverError::Protocol(detail),
    }
}

fn webdriver_capabilities(profile_dir: &Path) -> Value {
    let mut args = vec![
        format!("--user-data-dir={}", profile_dir.display()),
        "--start-maximized".to_string(),
        "--disable-incognito".to_string(),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
    ];
    if !cfg!(target_os = "macos") {
        args.push("--disable-dev-shm-usage".to_string());
    }
    let mut chrome_options = json!({ "args": args, "excludeSwitches": ["enable-automation"] });
    if let Some(binary) = detect_chrome_binary() {
        chrome_options["binary"] = json!(binary.to_string_lossy().to_string());
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "acceptInsecureCerts": true,
                "pageLoadStrategy": "normal",
                "timeouts": { "pageLoad": NAVIGATION_TIMEOUT.as_millis() as u64 },
                "goog:chromeOptions": chrome_options
            }
        }
    })
}

fn detect_chrome_binary() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("CHROME_BIN") {
        let p = PathBuf::from(v);
        if p.exists() {
            return Some(p);
        }
    }
    #[cfg(target_os = "macos")]
    {
        let p = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if p.exists() {
            return Some(p);
        }
    }
    None
}

fn webdriver_reachable(endpoint: &str) -> bool {
    let parsed = match Url::parse(endpoint) {
        Ok(u) => u,
        Err(_) => return false,
    };
    let host = match parsed.host_str() {
        Some(h) => h,
        None => return false,
    };
    let port = parsed.port_or_known_default().unwrap_or(9515);
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(2)).is_ok())
}

async fn start_webdriver(bin: &str, endpoint: &str, start_timeout: Duration) -> Result<Child, DriverError> {
    let parsed = Url::parse(endpoint).map_err(|e| DriverError::Launch(format!("invalid webdriver url: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| DriverError::Launch("webdriver url has no host".to_string()))?
        .to_ascii_lowercase();
    if host != "localhost" && host != "127.0.0.1" {
        return Err(DriverError::Launch(
            "autostart only supports localhost endpoints".to_string(),
        ));
    }
    let port = parsed.port_or_known_default().unwrap_or(9515);

    let mut child = Command::new(bin)
        .arg(format!("--port={port}"))
        .arg("--log-level=SEVERE")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .spawn()
        .map_err(|e| DriverError::Launch(format!("failed to spawn {bin}: {e}")))?;

    let steps = (start_timeout.as_millis() / 200).max(1);
    for _ in 0..steps {
        if webdriver_reachable(endpoint) {
            return Ok(child);
        }
        if let Ok(Some(status)) = child.try_wait() {
            return Err(DriverError::Launch(format!("{bin} exited early with status {status}")));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    let _ = child.kill();
    let _ = child.wait();
    Err(DriverError::Launch(format!("{bin} did not become ready in time")))
}

fn normalize_local_webdriver_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    if url.host_str() == Some("localhost") && url.set_host(Some("127.0.0.1")).is_ok() {
        return url.as_str().trim_end_matches('/').to_string();
    }
    trimmed.to_string()
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "..."
}
