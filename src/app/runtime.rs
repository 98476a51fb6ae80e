struct AbortTaskOnDrop(tokio::task::AbortHandle);

impl Drop for AbortTaskOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Default)]
struct RunSummary {
    sessions: usize,
    stats: SessionStats,
    first_started_at: Option<String>,
    last_finished_at: Option<String>,
    response: Option<AutomationResponse>,
}

impl RunSummary {
    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::SessionStarted { cycle, seeds } => {
                debug!(cycle, seeds, "session started");
            }
            EngineEvent::Visited {
                href,
                outcome,
                discovered,
            } => {
                debug!(%href, outcome = outcome.label(), discovered, "visited");
            }
            EngineEvent::SessionEnded { cycle, report } => {
                info!(
                    cycle,
                    end = ?report.end,
                    started_at = %report.started_at,
                    finished_at = %report.finished_at,
                    visits = report.stats.visits,
                    "session ended"
                );
                self.sessions += 1;
                self.stats.absorb(&report.stats);
                if self.first_started_at.is_none() {
                    self.first_started_at = Some(report.started_at);
                }
                self.last_finished_at = Some(report.finished_at);
            }
            EngineEvent::Completed(response) => self.response = Some(response),
        }
    }

    fn succeeded(&self) -> bool {
        self.response.as_ref().is_some_and(|r| r.success)
    }
}

fn seed_urls(cli: &Cli) -> io::Result<Vec<String>> {
    let path = cli.urls_file.clone().unwrap_or_else(default_urls_path);
    if cli.urls.is_empty() {
        let response = load_urls(&path);
        if !response.success {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                response.error.unwrap_or_else(|| "failed to load saved urls".to_string()),
            ));
        }
        info!(path = %path.display(), count = response.urls.len(), "loaded saved urls");
        return Ok(response.urls);
    }
    if cli.save_urls {
        save_urls(&path, &cli.urls)?;
    }
    Ok(cli.urls.clone())
}

pub async fn run() -> io::Result<()> {
    let mut cli = Cli::parse();
    init_tracing();

    cli.urls = seed_urls(&cli)?;
    let request = StartRequest::from(&cli);
    let profile_dir = cli.profile_dir.clone().unwrap_or_else(default_profile_dir);
    let launcher = WebDriverLauncher::new(&cli).map_err(io::Error::other)?;

    let (tx, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
    let mut engine = Engine::new(
        launcher,
        profile_dir,
        EngineHandle::default(),
        Box::new(SystemRandom::new(cli.seed)),
    )
    .with_events(tx);
    let stopper = engine.handle();
    let engine_task = tokio::spawn(async move { engine.start_automation(request).await });

    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current step");
            stopper.stop();
        }
    });
    let _signal_task_guard = AbortTaskOnDrop(signal_task.abort_handle());

    let mut summary = RunSummary::default();
    while let Some(event) = rx.recv().await {
        summary.handle_event(event);
    }

    if let Err(e) = engine_task.await {
        error!("engine task join error: {e}");
    }

    let stats = &summary.stats;
    eprintln!(
        "finished automation: sessions={} from={} to={} visits={} ok={} timeouts={} blocked={} script_errors={} discovered={} side_tabs={}",
        summary.sessions,
        summary.first_started_at.as_deref().unwrap_or("-"),
        summary.last_finished_at.as_deref().unwrap_or("-"),
        stats.visits,
        stats.ok,
        stats.timeouts,
        stats.blocked,
        stats.script_errors,
        stats.links_discovered,
        stats.side_tabs
    );
    if summary.succeeded() {
        return Ok(());
    }
    let err = summary
        .response
        .and_then(|r| r.error)
        .unwrap_or_else(|| "engine stopped without completing".to_string());
    Err(io::Error::other(err))
}

#[cfg(test)]
mod runtime_tests {
    use super::*;

    fn report(visits: usize, restart: bool, started_at: &str, finished_at: &str) -> SessionReport {
        SessionReport {
            restart,
            end: if restart {
                SessionEnd::Exhausted
            } else {
                SessionEnd::Stopped
            },
            stats: SessionStats {
                visits,
                ok: visits,
                ..SessionStats::default()
            },
            started_at: started_at.to_string(),
            finished_at: finished_at.to_string(),
        }
    }

    #[test]
    fn summary_folds_session_reports() {
        let mut summary = RunSummary::default();
        summary.handle_event(EngineEvent::SessionStarted { cycle: 1, seeds: 2 });
        summary.handle_event(EngineEvent::Visited {
            href: "https://a".to_string(),
            outcome: VisitOutcome::Ok,
            discovered: 3,
        });
        summary.handle_event(EngineEvent::SessionEnded {
            cycle: 1,
            report: report(3, true, "2026-01-01T10:00:00+00:00", "2026-01-01T10:05:00+00:00"),
        });
        summary.handle_event(EngineEvent::SessionEnded {
            cycle: 2,
            report: report(2, false, "2026-01-01T10:05:05+00:00", "2026-01-01T10:07:00+00:00"),
        });
        assert!(!summary.succeeded());
        summary.handle_event(EngineEvent::Completed(AutomationResponse::ok()));

        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.stats.visits, 5);
        assert_eq!(summary.stats.ok, 5);
        assert_eq!(summary.first_started_at.as_deref(), Some("2026-01-01T10:00:00+00:00"));
        assert_eq!(summary.last_finished_at.as_deref(), Some("2026-01-01T10:07:00+00:00"));
        assert!(summary.succeeded());
    }

    #[test]
    fn positional_urls_are_saved_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");
        let cli = Cli::parse_from([
            "sitewalk",
            "https://a.test/",
            "--save-urls",
            "--urls-file",
            path.to_str().unwrap(),
        ]);
        assert_eq!(seed_urls(&cli).unwrap(), vec!["https://a.test/".to_string()]);

        let cli = Cli::parse_from(["sitewalk", "--urls-file", path.to_str().unwrap()]);
        assert_eq!(seed_urls(&cli).unwrap(), vec!["https://a.test/".to_string()]);
    }

    #[test]
    fn unreadable_url_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.json");
        fs::write(&path, "not json").unwrap();
        let cli = Cli::parse_from(["sitewalk", "--urls-file", path.to_str().unwrap()]);
        assert!(seed_urls(&cli).is_err());
    }
}
