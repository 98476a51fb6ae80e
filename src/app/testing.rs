pub(super) struct ScriptedRandom {
    values: VecDeque<f64>,
    cycle: Option<Vec<f64>>,
    fallback: f64,
}

impl ScriptedRandom {
    pub(super) fn new<const N: usize>(values: [f64; N]) -> Self {
        ScriptedRandom {
            values: values.into_iter().collect(),
            cycle: None,
            fallback: 0.0,
        }
    }

    pub(super) fn cycling<const N: usize>(values: [f64; N]) -> Self {
        ScriptedRandom {
            values: VecDeque::new(),
            cycle: Some(values.to_vec()),
            fallback: 0.0,
        }
    }

    pub(super) fn constant(value: f64) -> Self {
        ScriptedRandom {
            values: VecDeque::new(),
            cycle: None,
            fallback: value,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        if self.values.is_empty() {
            if let Some(cycle) = &self.cycle {
                self.values.extend(cycle.iter().copied());
            }
        }
        self.values.pop_front().unwrap_or(self.fallback)
    }
}

pub(super) fn anchor(href: &str, text: &str, title: &str) -> Value {
    json!({ "href": href, "text": text, "title": title })
}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Call {
    OpenPage(PageId),
    Navigate(PageId, String),
    Evaluate(PageId, &'static str),
    ScrollBy(PageId, i64),
    MovePointer(PageId, f64, f64),
    Wait(PageId, Duration),
    ClosePage(PageId),
    CloseContext,
}

#[derive(Debug, Clone)]
pub(super) struct MockPage {
    scroll_height: f64,
    viewport_height: f64,
    anchors: Vec<(f64, Value)>,
    pointer_target: Option<(f64, f64)>,
    scroll_locked: bool,
}

impl Default for MockPage {
    fn default() -> Self {
        MockPage {
            scroll_height: 600.0,
            viewport_height: 800.0,
            anchors: Vec::new(),
            pointer_target: None,
            scroll_locked: false,
        }
    }
}

impl MockPage {
    pub(super) fn single_screen(anchors: Vec<Value>) -> Self {
        MockPage {
            anchors: anchors.into_iter().map(|a| (0.0, a)).collect(),
            ..MockPage::default()
        }
    }

    // Anchors become visible once `scrollY + viewport` reaches their offset.
    pub(super) fn tall(scroll_height: f64, viewport_height: f64, anchors: Vec<(f64, Value)>) -> Self {
        MockPage {
            scroll_height,
            viewport_height,
            anchors,
            ..MockPage::default()
        }
    }

    pub(super) fn pointer_target(mut self, x: f64, y: f64) -> Self {
        self.pointer_target = Some((x, y));
        self
    }

    pub(super) fn scroll_locked(mut self) -> Self {
        self.scroll_locked = true;
        self
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    pages: HashMap<String, MockPage>,
    navigation_failures: HashMap<String, bool>,
    failing_scripts: HashSet<&'static str>,
    script_args: Vec<(&'static str, Value)>,
    fail_launch: bool,
    launches: usize,
    next_page: usize,
    open: HashMap<PageId, (String, f64)>,
    peak_open: usize,
    closed: HashSet<PageId>,
    double_closes: usize,
    navigations: usize,
    navigation_timeouts: Vec<Duration>,
    stop_on_scroll: Option<Arc<AtomicBool>>,
    stop_after_navigations: Option<(usize, Arc<AtomicBool>)>,
}

impl MockState {
    fn page_for(&self, page: &PageId) -> MockPage {
        self.open
            .get(page)
            .and_then(|(url, _)| self.pages.get(url))
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
pub(super) struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

impl MockBrowser {
    pub(super) fn new() -> Self {
        MockBrowser::default()
    }

    fn with_state(self, f: impl FnOnce(&mut MockState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub(super) fn page(self, url: &str, page: MockPage) -> Self {
        self.with_state(|s| {
            s.pages.insert(url.to_string(), page);
        })
    }

    pub(super) fn fail_navigation(self, url: &str, timeout: bool) -> Self {
        self.with_state(|s| {
            s.navigation_failures.insert(url.to_string(), timeout);
        })
    }

    pub(super) fn fail_script(self, script: &str) -> Self {
        self.with_state(|s| {
            s.failing_scripts.insert(script_name(script));
        })
    }

    pub(super) fn fail_launch(self) -> Self {
        self.with_state(|s| s.fail_launch = true)
    }

    pub(super) fn stop_on_scroll(self, flag: Arc<AtomicBool>) -> Self {
        self.with_state(|s| s.stop_on_scroll = Some(flag))
    }

    pub(super) fn stop_after_navigations(self, count: usize, flag: Arc<AtomicBool>) -> Self {
        self.with_state(|s| s.stop_after_navigations = Some((count, flag)))
    }

    pub(super) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(super) fn calls_after_navigation(&self) -> Vec<Call> {
        let calls = self.calls();
        let start = calls
            .iter()
            .rposition(|c| matches!(c, Call::Navigate(..)))
            .map(|i| i + 1)
            .unwrap_or(0);
        calls[start..].to_vec()
    }

    pub(super) fn navigated_urls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Navigate(_, url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub(super) fn script_args(&self) -> Vec<(&'static str, Value)> {
        self.state.lock().unwrap().script_args.clone()
    }

    pub(super) fn navigation_timeouts(&self) -> Vec<Duration> {
        self.state.lock().unwrap().navigation_timeouts.clone()
    }

    pub(super) fn launches(&self) -> usize {
        self.state.lock().unwrap().launches
    }

    pub(super) fn open_pages(&self) -> Vec<PageId> {
        self.state.lock().unwrap().open.keys().cloned().collect()
    }

    pub(super) fn peak_open(&self) -> usize {
        self.state.lock().unwrap().peak_open
    }

    pub(super) fn double_closes(&self) -> usize {
        self.state.lock().unwrap().double_closes
    }

    pub(super) fn forget_page(&self, page: &PageId) {
        self.state.lock().unwrap().open.remove(page);
    }
}

fn script_name(script: &str) -> &'static str {
    if script == PAGE_METRICS_SCRIPT {
        "page_metrics"
    } else if script == COLLECT_ANCHORS_SCRIPT {
        "collect_anchors"
    } else if script == POINTER_TARGET_SCRIPT {
        "pointer_target"
    } else if script == SELECT_TEXT_SCRIPT {
        "select_text"
    } else {
        "unknown"
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    type Context = MockContext;

    async fn launch(&self, _profile_dir: &Path) -> Result<MockContext, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.launches += 1;
        if state.fail_launch {
            return Err(DriverError::Launch("profile is locked".to_string()));
        }
        Ok(MockContext {
            state: self.state.clone(),
        })
    }
}

pub(super) struct MockContext {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl BrowserContext for MockContext {
    async fn open_page(&mut self) -> Result<PageId, DriverError> {
        let mut s = self.state.lock().unwrap();
        s.next_page += 1;
        let page = PageId(format!("page-{}", s.next_page));
        s.open.insert(page.clone(), ("about:blank".to_string(), 0.0));
        s.peak_open = s.peak_open.max(s.open.len());
        s.calls.push(Call::OpenPage(page.clone()));
        Ok(page)
    }

    async fn navigate(&mut self, page: &PageId, url: &str, timeout: Duration) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::Navigate(page.clone(), url.to_string()));
        s.navigations += 1;
        s.navigation_timeouts.push(timeout);
        if let Some((count, flag)) = &s.stop_after_navigations {
            if s.navigations >= *count {
                flag.store(false, Ordering::SeqCst);
            }
        }
        if let Some(timeout) = s.navigation_failures.get(url).copied() {
            return Err(if timeout {
                DriverError::Timeout(format!("navigation to {url} exceeded 30s"))
            } else {
                DriverError::Protocol("unknown error: net::ERR_CONNECTION_REFUSED".to_string())
            });
        }
        match s.open.get_mut(page) {
            Some(entry) => {
                *entry = (url.to_string(), 0.0);
                Ok(())
            }
            None => Err(DriverError::Protocol("no such window".to_string())),
        }
    }

    async fn evaluate(&mut self, page: &PageId, script: &str, args: Value) -> Result<Value, DriverError> {
        let mut s = self.state.lock().unwrap();
        let name = script_name(script);
        s.calls.push(Call::Evaluate(page.clone(), name));
        if args.as_array().is_some_and(|a| !a.is_empty()) {
            s.script_args.push((name, args));
        }
        if s.failing_scripts.contains(name) || !s.open.contains_key(page) {
            return Err(DriverError::Script(format!("{name} threw")));
        }
        let scroll_y = s.open.get(page).map(|(_, y)| *y).unwrap_or(0.0);
        let mock = s.page_for(page);
        match name {
            "page_metrics" => Ok(json!({
                "scrollY": scroll_y,
                "innerHeight": mock.viewport_height,
                "scrollHeight": mock.scroll_height
            })),
            "collect_anchors" => {
                let visible_to = scroll_y + mock.viewport_height;
                Ok(Value::Array(
                    mock.anchors
                        .iter()
                        .filter(|(at, _)| *at <= visible_to)
                        .map(|(_, a)| a.clone())
                        .collect(),
                ))
            }
            "pointer_target" => Ok(mock
                .pointer_target
                .map(|(x, y)| json!({ "x": x, "y": y }))
                .unwrap_or(Value::Null)),
            "select_text" => Ok(json!(true)),
            _ => Err(DriverError::Script("unknown script".to_string())),
        }
    }

    async fn scroll_by(&mut self, page: &PageId, dy: i64) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::ScrollBy(page.clone(), dy));
        if let Some(flag) = &s.stop_on_scroll {
            flag.store(false, Ordering::SeqCst);
        }
        let mock = s.page_for(page);
        let max_y = if mock.scroll_locked {
            0.0
        } else {
            (mock.scroll_height - mock.viewport_height).max(0.0)
        };
        match s.open.get_mut(page) {
            Some((_, y)) => {
                *y = (*y + dy as f64).clamp(0.0, max_y);
                Ok(())
            }
            None => Err(DriverError::Protocol("no such window".to_string())),
        }
    }

    async fn move_pointer(&mut self, page: &PageId, x: f64, y: f64) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::MovePointer(page.clone(), x, y));
        Ok(())
    }

    async fn wait(&mut self, page: &PageId, duration: Duration) {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Wait(page.clone(), duration));
    }

    async fn close_page(&mut self, page: &PageId) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::ClosePage(page.clone()));
        if s.open.remove(page).is_none() {
            if s.closed.contains(page) {
                s.double_closes += 1;
            }
            return Err(DriverError::Protocol("no such window".to_string()));
        }
        s.closed.insert(page.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::CloseContext);
        s.open.clear();
        Ok(())
    }
}
