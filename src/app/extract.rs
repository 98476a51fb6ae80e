const PAGE_METRICS_SCRIPT: &str = r#"
    const root = document.documentElement;
    return {
        scrollY: window.scrollY || 0,
        innerHeight: window.innerHeight || 0,
        scrollHeight: root ? root.scrollHeight : 0
    };
"#;

const COLLECT_ANCHORS_SCRIPT: &str = r#"
    return Array.from(document.querySelectorAll('a'))
        .filter(el => el.href)
        .map(el => ({
            href: String(el.href),
            text: (el.textContent || '').trim(),
            title: el.getAttribute('title') || ''
        }));
"#;

const INTERESTING_KEYWORDS: [&str; 9] = [
    "detail", "view", "read", "more", "article", "详情", "查看", "阅读", "更多",
];
const BORING_KEYWORDS: [&str; 6] = ["login", "register", "copyright", "登录", "注册", "版权"];

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMetrics {
    #[serde(default)]
    scroll_y: f64,
    #[serde(default)]
    inner_height: f64,
    #[serde(default)]
    scroll_height: f64,
}

impl PageMetrics {
    fn is_single_screen(&self) -> bool {
        self.scroll_height <= self.inner_height
    }

    fn reached_bottom(&self) -> bool {
        self.scroll_y + self.inner_height >= self.scroll_height - BOTTOM_SLACK_PX
    }
}

#[derive(Debug, Default)]
struct Harvest {
    links: Vec<Link>,
    script_errors: usize,
}

async fn page_metrics<C: BrowserContext + ?Sized>(
    ctx: &mut C,
    page: &PageId,
) -> Result<PageMetrics, DriverError> {
    let value = ctx.evaluate(page, PAGE_METRICS_SCRIPT, json!([])).await?;
    serde_json::from_value(value).map_err(|e| DriverError::Script(format!("page metrics: {e}")))
}

async fn collect_page_links<C: BrowserContext + ?Sized>(
    ctx: &mut C,
    page: &PageId,
    frontier: &Frontier,
) -> Harvest {
    let value = match ctx.evaluate(page, COLLECT_ANCHORS_SCRIPT, json!([])).await {
        Ok(value) => value,
        Err(err) => {
            warn!(page = %page, "error collecting links: {err}");
            return Harvest {
                links: Vec::new(),
                script_errors: 1,
            };
        }
    };
    let anchors = match serde_json::from_value::<Vec<RawAnchor>>(value) {
        Ok(anchors) => anchors,
        Err(err) => {
            warn!(page = %page, "unexpected anchor payload: {err}");
            return Harvest {
                links: Vec::new(),
                script_errors: 1,
            };
        }
    };
    Harvest {
        links: dedup_by_quality(filter_new_links(anchors, frontier)),
        script_errors: 0,
    }
}

fn filter_new_links(anchors: Vec<RawAnchor>, frontier: &Frontier) -> Vec<Link> {
    anchors
        .into_iter()
        .filter_map(Link::from_anchor)
        .filter(|link| !frontier.is_visited(&link.href))
        .collect()
}

fn dedup_by_quality(links: Vec<Link>) -> Vec<Link> {
    let mut out: Vec<Link> = Vec::with_capacity(links.len());
    let mut positions = HashMap::<String, usize>::new();
    for link in links {
        match positions.get(&link.href) {
            Some(&pos) => {
                if link.outranks(&out[pos]) {
                    out[pos] = link;
                }
            }
            None => {
                positions.insert(link.href.clone(), out.len());
                out.push(link);
            }
        }
    }
    out
}

async fn harvest_links<C: BrowserContext + ?Sized>(
    ctx: &mut C,
    page: &PageId,
    frontier: &Frontier,
    scroll_interval: Duration,
    running: &AtomicBool,
) -> Result<Harvest, DriverError> {
    let metrics = page_metrics(ctx, page).await?;
    if metrics.is_single_screen() {
        debug!(page = %page, "single screen page, collecting links");
        return Ok(collect_page_links(ctx, page, frontier).await);
    }

    debug!(page = %page, height = metrics.scroll_height, "scrolling page, collecting links while scrolling");
    let mut accumulated = Vec::new();
    let mut script_errors = 0;
    let mut last_y: Option<f64> = None;
    while running.load(Ordering::Relaxed) {
        let harvest = collect_page_links(ctx, page, frontier).await;
        accumulated.extend(harvest.links);
        script_errors += harvest.script_errors;

        let reached_bottom = match page_metrics(ctx, page).await {
            Ok(metrics) if last_y.is_some_and(|y| metrics.scroll_y <= y) => {
                debug!(page = %page, y = metrics.scroll_y, "scroll position stuck, treating as bottom");
                true
            }
            Ok(metrics) => {
                last_y = Some(metrics.scroll_y);
                metrics.reached_bottom()
            }
            Err(err) => {
                warn!(page = %page, "bottom check failed, stopping scroll: {err}");
                script_errors += 1;
                true
            }
        };
        if reached_bottom || !running.load(Ordering::Relaxed) {
            break;
        }
        if let Err(err) = ctx.scroll_by(page, SCROLL_STEP_PX).await {
            warn!(page = %page, "scroll failed: {err}");
            script_errors += 1;
            break;
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }
        ctx.wait(page, scroll_interval).await;
    }

    let links = dedup_by_quality(accumulated)
        .into_iter()
        .filter(|link| !frontier.is_visited(&link.href))
        .collect();
    Ok(Harvest {
        links,
        script_errors,
    })
}

fn score_link(link: &Link) -> i32 {
    let text = link.text.to_lowercase();
    let len = text.chars().count();
    let mut score = 0;
    if len > 10 && len < 100 {
        score += 2;
    }
    if INTERESTING_KEYWORDS.iter().any(|k| text.contains(k)) {
        score += 3;
    }
    if BORING_KEYWORDS.iter().any(|k| text.contains(k)) {
        score -= 3;
    }
    score
}

fn select_interesting_link<'a>(links: &'a [Link], rng: &mut dyn RandomSource) -> Option<&'a Link> {
    if links.is_empty() {
        return None;
    }
    let mut ranked = links
        .iter()
        .map(|link| (score_link(link) as f64 + rng.next_f64() - 0.5, link))
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
    let top = (ranked.len() / 2).max(1);
    Some(ranked[rng.index(top)].1)
}

#[cfg(test)]
mod extract_tests {
    use super::testing::{Call, MockBrowser, MockContext, MockPage, ScriptedRandom, anchor};
    use super::*;

    async fn open(browser: &MockBrowser, url: &str) -> (MockContext, PageId) {
        let mut ctx = browser.launch(Path::new("/tmp/profile")).await.unwrap();
        let page = ctx.open_page().await.unwrap();
        ctx.navigate(&page, url, NAVIGATION_TIMEOUT).await.unwrap();
        (ctx, page)
    }

    #[tokio::test]
    async fn filters_to_plain_http_links() {
        let browser = MockBrowser::new().page(
            "https://start",
            MockPage::single_screen(vec![
                anchor("https://a/#frag", "frag", ""),
                anchor("javascript:void(0)", "js", ""),
                anchor("mailto:x@y.com", "mail", ""),
                anchor("tel:123", "phone", ""),
                anchor("https://b/page", "B page", ""),
            ]),
        );
        let (mut ctx, page) = open(&browser, "https://start").await;
        let frontier = Frontier::seeded(&["https://start".to_string()]);
        let harvest = collect_page_links(&mut ctx, &page, &frontier).await;
        let hrefs = harvest.links.iter().map(|l| l.href.as_str()).collect::<Vec<_>>();
        assert_eq!(hrefs, vec!["https://b/page"]);
        assert_eq!(harvest.script_errors, 0);
    }

    #[tokio::test]
    async fn drops_visited_and_prefers_richer_duplicates() {
        let browser = MockBrowser::new().page(
            "https://start",
            MockPage::single_screen(vec![
                anchor("https://a/", "A", ""),
                anchor("https://a/", "A longer description", ""),
                anchor("https://x/", "x", ""),
                anchor("https://x/", "x", "T"),
                anchor("https://seen/", "already", ""),
                anchor("https://blank/", "   ", ""),
            ]),
        );
        let (mut ctx, page) = open(&browser, "https://start").await;
        let mut frontier = Frontier::seeded(&["https://start".to_string()]);
        frontier.mark_visited(&Link::new("https://seen/"));

        let harvest = collect_page_links(&mut ctx, &page, &frontier).await;
        assert_eq!(harvest.links.len(), 3);
        assert_eq!(harvest.links[0].text, "A longer description");
        assert_eq!(harvest.links[1].title, "T");
        assert_eq!(harvest.links[2].text, "https://blank/");
    }

    #[tokio::test]
    async fn extraction_failure_is_zero_links() {
        let browser = MockBrowser::new()
            .page("https://start", MockPage::single_screen(vec![anchor("https://b/", "b", "")]))
            .fail_script(COLLECT_ANCHORS_SCRIPT);
        let (mut ctx, page) = open(&browser, "https://start").await;
        let frontier = Frontier::default();
        let harvest = collect_page_links(&mut ctx, &page, &frontier).await;
        assert!(harvest.links.is_empty());
        assert_eq!(harvest.script_errors, 1);
    }

    #[tokio::test]
    async fn single_screen_page_is_read_once_without_scrolling() {
        let browser = MockBrowser::new().page(
            "https://start",
            MockPage::single_screen(vec![anchor("https://b/", "b", "")]),
        );
        let (mut ctx, page) = open(&browser, "https://start").await;
        let running = AtomicBool::new(true);
        let harvest = harvest_links(&mut ctx, &page, &Frontier::default(), Duration::from_millis(1000), &running)
            .await
            .unwrap();
        assert_eq!(harvest.links.len(), 1);
        let calls = browser.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::ScrollBy(..))));
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Evaluate(_, "collect_anchors"))).count(),
            1
        );
    }

    #[tokio::test]
    async fn tall_page_scrolls_to_bottom_collecting_as_it_goes() {
        // 1000px page in a 400px viewport: bottom is reached once scrollY >= 500.
        let browser = MockBrowser::new().page(
            "https://start",
            MockPage::tall(
                1000.0,
                400.0,
                vec![
                    (0.0, anchor("https://top/", "top", "")),
                    (700.0, anchor("https://middle/", "m", "")),
                    (700.0, anchor("https://top/", "top link with more text", "")),
                    (1000.0, anchor("https://footer/", "footer", "")),
                ],
            ),
        );
        let (mut ctx, page) = open(&browser, "https://start").await;
        let running = AtomicBool::new(true);
        let interval = Duration::from_millis(250);
        let harvest = harvest_links(&mut ctx, &page, &Frontier::default(), interval, &running)
            .await
            .unwrap();

        let hrefs = harvest.links.iter().map(|l| l.href.as_str()).collect::<Vec<_>>();
        assert_eq!(hrefs, vec!["https://top/", "https://middle/", "https://footer/"]);
        assert_eq!(harvest.links[0].text, "top link with more text");

        let calls = browser.calls();
        let scrolls = calls.iter().filter(|c| matches!(c, Call::ScrollBy(_, 300))).count();
        let waits = calls
            .iter()
            .filter(|c| matches!(c, Call::Wait(_, d) if *d == interval))
            .count();
        assert_eq!(scrolls, 2);
        assert_eq!(waits, 2);
    }

    #[tokio::test]
    async fn page_that_never_scrolls_is_treated_as_bottom() {
        let browser = MockBrowser::new().page(
            "https://start",
            MockPage::tall(5000.0, 400.0, vec![(0.0, anchor("https://top/", "top", ""))]).scroll_locked(),
        );
        let (mut ctx, page) = open(&browser, "https://start").await;
        let running = AtomicBool::new(true);
        let harvest = harvest_links(&mut ctx, &page, &Frontier::default(), Duration::from_millis(1000), &running)
            .await
            .unwrap();

        assert_eq!(harvest.links.len(), 1);
        assert_eq!(harvest.script_errors, 0);
        let calls = browser.calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::ScrollBy(..))).count(), 1);
        assert_eq!(
            calls.iter().filter(|c| matches!(c, Call::Evaluate(_, "collect_anchors"))).count(),
            2
        );
    }

    #[tokio::test]
    async fn stop_during_scroll_ends_the_loop_immediately() {
        let running = Arc::new(AtomicBool::new(true));
        let browser = MockBrowser::new()
            .page("https://start", MockPage::tall(5000.0, 400.0, Vec::new()))
            .stop_on_scroll(running.clone());
        let (mut ctx, page) = open(&browser, "https://start").await;
        harvest_links(&mut ctx, &page, &Frontier::default(), Duration::from_millis(1000), &running)
            .await
            .unwrap();

        let calls = browser.calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::ScrollBy(..))).count(), 1);
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Wait(..))).count(), 0);
    }

    #[tokio::test]
    async fn unmeasurable_page_is_an_error() {
        let browser = MockBrowser::new().fail_script(PAGE_METRICS_SCRIPT);
        let (mut ctx, page) = open(&browser, "https://start").await;
        let running = AtomicBool::new(true);
        let result = harvest_links(&mut ctx, &page, &Frontier::default(), Duration::ZERO, &running).await;
        assert!(matches!(result, Err(DriverError::Script(_))));
    }

    #[test]
    fn scoring_rewards_descriptive_links() {
        assert_eq!(score_link(&Link::new("https://a").with_text("Read the full article")), 5);
        assert_eq!(score_link(&Link::new("https://a").with_text("Login")), -3);
        assert_eq!(score_link(&Link::new("https://a").with_text("查看详情")), 3);
        assert_eq!(score_link(&Link::new("https://a").with_text("ok")), 0);
    }

    #[test]
    fn interesting_link_comes_from_the_top_half() {
        let links = vec![
            Link::new("https://a/login").with_text("Login"),
            Link::new("https://a/story").with_text("Read the full article"),
            Link::new("https://a/x").with_text("x"),
            Link::new("https://a/copy").with_text("Copyright 2024"),
        ];
        let mut rng = ScriptedRandom::new([0.5, 0.5, 0.5, 0.5, 0.0]);
        let pick = select_interesting_link(&links, &mut rng).unwrap();
        assert_eq!(pick.href, "https://a/story");
        assert!(select_interesting_link(&[], &mut rng).is_none());
    }
}
