#[derive(Debug, Clone, Default)]
struct EngineHandle {
    running: Arc<AtomicBool>,
}

impl EngineHandle {
    fn stop(&self) -> AutomationResponse {
        self.running.store(false, Ordering::SeqCst);
        info!("stop requested");
        AutomationResponse::ok()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }
}

struct Engine<L: BrowserLauncher> {
    launcher: L,
    profile_dir: PathBuf,
    handle: EngineHandle,
    rng: Box<dyn RandomSource>,
    events: Option<UnboundedSender<EngineEvent>>,
    config: EngineConfig,
    sessions: usize,
    totals: SessionStats,
}

impl<L: BrowserLauncher> Engine<L> {
    fn new(launcher: L, profile_dir: PathBuf, handle: EngineHandle, rng: Box<dyn RandomSource>) -> Self {
        Engine {
            launcher,
            profile_dir,
            handle,
            rng,
            events: None,
            config: EngineConfig::default(),
            sessions: 0,
            totals: SessionStats::default(),
        }
    }

    fn with_events(mut self, tx: UnboundedSender<EngineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    async fn start_automation(&mut self, request: StartRequest) -> AutomationResponse {
        self.start(request.into()).await
    }

    // Sends `Completed` exactly once, whatever the result.
    async fn start(&mut self, config: EngineConfig) -> AutomationResponse {
        let response = match self.run(config).await {
            Ok(()) => AutomationResponse::ok(),
            Err(err) => {
                error!("fatal error: {err}");
                AutomationResponse::failed(err.to_string())
            }
        };
        self.handle.running.store(false, Ordering::SeqCst);
        send_event(self.events.as_ref(), EngineEvent::Completed(response.clone()));
        response
    }

    async fn run(&mut self, config: EngineConfig) -> Result<(), EngineError> {
        config.validate()?;
        self.handle.running.store(true, Ordering::SeqCst);
        info!(urls = ?config.seed_urls, "starting automation");
        self.config = config;
        fs::create_dir_all(&self.profile_dir)?;

        let mut cycle = 0;
        while self.handle.is_running() {
            cycle += 1;
            info!(cycle, "starting new automation cycle");
            let ctx = self.launcher.launch(&self.profile_dir).await?;
            self.sessions += 1;
            send_event(
                self.events.as_ref(),
                EngineEvent::SessionStarted {
                    cycle,
                    seeds: self.config.seed_urls.len(),
                },
            );

            let report = SessionController::new(
                cycle,
                ctx,
                &self.config,
                &self.handle.running,
                self.rng.as_mut(),
                self.events.as_ref(),
            )
            .run()
            .await;
            self.totals.absorb(&report.stats);
            let restart = report.restart;
            send_event(self.events.as_ref(), EngineEvent::SessionEnded { cycle, report });

            if restart && self.handle.is_running() {
                info!("restarting automation in {}s", RESTART_DELAY.as_secs());
                tokio::time::sleep(RESTART_DELAY).await;
            } else {
                break;
            }
        }
        info!(
            sessions = self.sessions,
            visits = self.totals.visits,
            discovered = self.totals.links_discovered,
            "automation finished"
        );
        Ok(())
    }
}
