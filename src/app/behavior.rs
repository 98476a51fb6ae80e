const POINTER_TARGET_SCRIPT: &str = r#"
    const fullyVisible = el => {
        const rect = el.getBoundingClientRect();
        return rect.top >= 0 && rect.left >= 0 &&
            rect.bottom <= window.innerHeight && rect.right <= window.innerWidth;
    };
    const candidates = Array.from(document.querySelectorAll('a, button, img')).filter(fullyVisible);
    if (candidates.length === 0) return null;
    const pick = Math.min(candidates.length - 1, Math.floor(arguments[0] * candidates.length));
    const rect = candidates[pick].getBoundingClientRect();
    return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 };
"#;

const SELECT_TEXT_SCRIPT: &str = r#"
    const candidates = Array.from(document.querySelectorAll('p, h1, h2, h3, span')).filter(el => {
        const rect = el.getBoundingClientRect();
        return rect.top >= 0 && rect.left >= 0 &&
            rect.bottom <= window.innerHeight && rect.right <= window.innerWidth &&
            (el.textContent || '').trim().length > 0;
    });
    if (candidates.length === 0) return false;
    const pick = Math.min(candidates.length - 1, Math.floor(arguments[0] * candidates.length));
    const element = candidates[pick];
    const selection = window.getSelection();
    const range = document.createRange();
    range.selectNodeContents(element);
    selection.removeAllRanges();
    selection.addRange(range);
    return true;
"#;

const RANDOM_SCROLL_PX: (u64, u64) = (100, 601);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Scroll,
    MovePointer,
    SelectText,
}

const BEHAVIORS: [Behavior; 3] = [Behavior::Scroll, Behavior::MovePointer, Behavior::SelectText];

#[derive(Debug, Clone, Copy, Deserialize)]
struct PointerTarget {
    x: f64,
    y: f64,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BehaviorReport {
    performed: Vec<Behavior>,
    failures: usize,
}

async fn simulate_user_behavior<C: BrowserContext + ?Sized>(
    ctx: &mut C,
    page: &PageId,
    rng: &mut dyn RandomSource,
) -> BehaviorReport {
    let mut report = BehaviorReport::default();
    let count = 1 + rng.index(3);
    for _ in 0..count {
        let behavior = BEHAVIORS[rng.index(BEHAVIORS.len())];
        report.performed.push(behavior);
        if let Err(err) = perform_behavior(ctx, page, behavior, rng).await {
            warn!(page = %page, ?behavior, "behavior failed: {err}");
            report.failures += 1;
            continue;
        }
        let pause = random_pause(rng, BEHAVIOR_PAUSE_MS);
        ctx.wait(page, pause).await;
    }
    report
}

async fn perform_behavior<C: BrowserContext + ?Sized>(
    ctx: &mut C,
    page: &PageId,
    behavior: Behavior,
    rng: &mut dyn RandomSource,
) -> Result<(), DriverError> {
    match behavior {
        Behavior::Scroll => {
            let amount = rng.between(RANDOM_SCROLL_PX.0, RANDOM_SCROLL_PX.1) as i64;
            ctx.scroll_by(page, amount).await?;
            debug!(page = %page, "randomly scrolled {amount}px");
        }
        Behavior::MovePointer => {
            let value = ctx
                .evaluate(page, POINTER_TARGET_SCRIPT, json!([rng.next_f64()]))
                .await?;
            match serde_json::from_value::<Option<PointerTarget>>(value)
                .map_err(|e| DriverError::Script(format!("pointer target: {e}")))?
            {
                Some(target) => {
                    ctx.move_pointer(page, target.x, target.y).await?;
                    debug!(page = %page, x = target.x, y = target.y, "moved pointer to element");
                }
                None => debug!(page = %page, "no fully visible element to point at"),
            }
        }
        Behavior::SelectText => {
            ctx.evaluate(page, SELECT_TEXT_SCRIPT, json!([rng.next_f64()])).await?;
            debug!(page = %page, "selected some text");
        }
    }
    Ok(())
}
