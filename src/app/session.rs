struct SessionController<'a, C: BrowserContext> {
    cycle: usize,
    ctx: C,
    frontier: Frontier,
    pool: PagePool,
    config: &'a EngineConfig,
    running: &'a AtomicBool,
    rng: &'a mut dyn RandomSource,
    events: Option<&'a UnboundedSender<EngineEvent>>,
    state: SessionState,
    stats: SessionStats,
}

impl<'a, C: BrowserContext> SessionController<'a, C> {
    fn new(
        cycle: usize,
        ctx: C,
        config: &'a EngineConfig,
        running: &'a AtomicBool,
        rng: &'a mut dyn RandomSource,
        events: Option<&'a UnboundedSender<EngineEvent>>,
    ) -> Self {
        SessionController {
            cycle,
            ctx,
            frontier: Frontier::seeded(&config.seed_urls),
            pool: PagePool::new(config.max_open_pages),
            config,
            running,
            rng,
            events,
            state: SessionState::Seeded,
            stats: SessionStats::default(),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(cycle = self.cycle, from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }

    async fn run(mut self) -> SessionReport {
        let started_at = Utc::now().to_rfc3339();
        let end = loop {
            if !self.is_running() {
                break SessionEnd::Stopped;
            }
            let Some(link) = self.frontier.next_unvisited(self.rng) else {
                info!(
                    cycle = self.cycle,
                    exhausted = self.frontier.is_exhausted(),
                    "all links have been visited"
                );
                break SessionEnd::Exhausted;
            };
            self.visit(&link).await;
        };
        self.transition(match end {
            SessionEnd::Exhausted => SessionState::Exhausted,
            SessionEnd::Stopped => SessionState::Stopped,
        });

        self.pool.release_all(&mut self.ctx).await;
        if let Err(err) = self.ctx.close().await {
            warn!(cycle = self.cycle, "failed to close browsing context: {err}");
        }
        info!(
            cycle = self.cycle,
            visits = self.stats.visits,
            known = self.frontier.known_len(),
            visited = self.frontier.visited_len(),
            pages_closed = self.pool.closed(),
            "session ended: {end:?}"
        );
        SessionReport {
            restart: end == SessionEnd::Exhausted,
            end,
            stats: self.stats,
            started_at,
            finished_at: Utc::now().to_rfc3339(),
        }
    }

    async fn visit(&mut self, link: &Link) {
        self.transition(SessionState::Visiting);
        info!(href = %link.href, "opening link: {}", link.text);
        let (outcome, page) = self.open_link(link).await;
        let Some(page) = page else {
            self.finish_visit(link, outcome, 0);
            return;
        };

        self.transition(SessionState::Extracting);
        let harvest = match harvest_links(
            &mut self.ctx,
            &page,
            &self.frontier,
            self.config.scroll_interval,
            self.running,
        )
        .await
        {
            Ok(harvest) => harvest,
            Err(err) => {
                warn!(href = %link.href, "error processing link: {err}");
                self.finish_visit(link, VisitOutcome::ScriptError, 0);
                return;
            }
        };
        let outcome = if harvest.script_errors > 0 {
            VisitOutcome::ScriptError
        } else {
            outcome
        };
        let added = self.frontier.merge(harvest.links.clone());
        self.stats.links_discovered += added;
        info!(href = %link.href, "added {added} new unique links");
        self.finish_visit(link, outcome, added);

        debug!("waiting {}s", self.config.visit_duration.as_secs());
        self.ctx.wait(&page, self.config.visit_duration).await;
        let reading = random_pause(self.rng, READING_PAUSE_MS);
        debug!("reading for another {}ms", reading.as_millis());
        self.ctx.wait(&page, reading).await;

        self.transition(SessionState::Simulating);
        if self.rng.chance(BEHAVIOR_PROBABILITY) {
            simulate_user_behavior(&mut self.ctx, &page, self.rng).await;
            self.stats.behavior_runs += 1;
        }

        if self.config.tabs_per_visit > 0 {
            self.open_side_tabs(harvest.links).await;
        }
    }

    // A link counts as visited whether or not navigation succeeds.
    async fn open_link(&mut self, link: &Link) -> (VisitOutcome, Option<PageId>) {
        let page = match self.pool.acquire(&mut self.ctx).await {
            Ok(page) => page,
            Err(err) => {
                warn!(href = %link.href, "failed to open a page: {err}");
                self.frontier.mark_visited(link);
                return (VisitOutcome::Blocked, None);
            }
        };
        let result = self.ctx.navigate(&page, &link.href, NAVIGATION_TIMEOUT).await;
        self.frontier.mark_visited(link);
        match result {
            Ok(()) => (VisitOutcome::Ok, Some(page)),
            Err(DriverError::Timeout(err)) => {
                warn!(href = %link.href, "failed to open link: {err}");
                (VisitOutcome::Timeout, None)
            }
            Err(err) => {
                warn!(href = %link.href, "failed to open link: {err}");
                (VisitOutcome::Blocked, None)
            }
        }
    }

    fn finish_visit(&mut self, link: &Link, outcome: VisitOutcome, discovered: usize) {
        self.stats.record(outcome);
        send_event(
            self.events,
            EngineEvent::Visited {
                href: link.href.clone(),
                outcome,
                discovered,
            },
        );
    }

    async fn open_side_tabs(&mut self, mut candidates: Vec<Link>) {
        candidates.retain(|link| !self.frontier.is_visited(&link.href));
        let mut opened = 0;
        while opened < self.config.tabs_per_visit && !candidates.is_empty() {
            if !self.is_running() {
                break;
            }
            let Some(link) = select_interesting_link(&candidates, self.rng).cloned() else {
                break;
            };
            candidates.retain(|c| c.href != link.href);
            info!(href = %link.href, "opening new tab for: {}", link.text);
            let (outcome, page) = self.open_link(&link).await;
            self.stats.side_tabs += 1;
            self.finish_visit(&link, outcome, 0);
            if let Some(page) = page {
                let delay = random_pause(self.rng, SIDE_TAB_DELAY_MS);
                self.ctx.wait(&page, delay).await;
            }
            opened += 1;
        }
    }
}
