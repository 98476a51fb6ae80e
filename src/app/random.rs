trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;

    fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        ((self.next_f64() * len as f64) as usize).min(len - 1)
    }

    // `low` when the range is empty.
    fn between(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        let span = high - low;
        low + ((self.next_f64() * span as f64) as u64).min(span - 1)
    }

    fn chance(&mut self, probability: f64) -> bool {
        self.next_f64() < probability
    }
}

struct SystemRandom(StdRng);

impl SystemRandom {
    fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => SystemRandom(StdRng::seed_from_u64(seed)),
            None => SystemRandom(StdRng::from_os_rng()),
        }
    }
}

impl RandomSource for SystemRandom {
    fn next_f64(&mut self) -> f64 {
        self.0.random::<f64>()
    }
}

fn shuffle<T>(rng: &mut dyn RandomSource, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.index(i + 1);
        items.swap(i, j);
    }
}

fn random_pause(rng: &mut dyn RandomSource, range_ms: (u64, u64)) -> Duration {
    Duration::from_millis(rng.between(range_ms.0, range_ms.1))
}
