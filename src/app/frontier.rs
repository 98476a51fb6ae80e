// `visited` never holds an href that `known` lacks.
#[derive(Debug, Default)]
struct Frontier {
    known: Vec<Link>,
    positions: HashMap<String, usize>,
    visited: HashSet<String>,
}

impl Frontier {
    fn seeded(urls: &[String]) -> Self {
        let mut frontier = Frontier::default();
        frontier.seed(urls);
        frontier
    }

    fn seed(&mut self, urls: &[String]) {
        self.known.clear();
        self.positions.clear();
        self.visited.clear();
        for url in urls {
            let url = url.trim();
            if url.is_empty() || self.positions.contains_key(url) {
                continue;
            }
            self.insert(Link::new(url));
        }
    }

    fn insert(&mut self, link: Link) {
        self.positions.insert(link.href.clone(), self.known.len());
        self.known.push(link);
    }

    fn merge(&mut self, links: Vec<Link>) -> usize {
        let mut inserted = 0;
        for link in links {
            match self.positions.get(&link.href) {
                Some(&pos) => self.known[pos].absorb(&link),
                None => {
                    self.insert(link);
                    inserted += 1;
                }
            }
        }
        inserted
    }

    fn next_unvisited(&self, rng: &mut dyn RandomSource) -> Option<Link> {
        let mut order = (0..self.known.len()).collect::<Vec<_>>();
        shuffle(rng, &mut order);
        order
            .into_iter()
            .map(|pos| &self.known[pos])
            .find(|link| !self.visited.contains(&link.href))
            .cloned()
    }

    fn mark_visited(&mut self, link: &Link) {
        if !self.positions.contains_key(&link.href) {
            self.insert(link.clone());
        }
        self.visited.insert(link.href.clone());
    }

    fn is_visited(&self, href: &str) -> bool {
        self.visited.contains(href)
    }

    #[cfg(test)]
    fn get(&self, href: &str) -> Option<&Link> {
        self.positions.get(href).map(|pos| &self.known[*pos])
    }

    fn known_len(&self) -> usize {
        self.known.len()
    }

    fn visited_len(&self) -> usize {
        self.visited.len()
    }

    fn is_exhausted(&self) -> bool {
        self.visited.len() >= self.known.len()
    }
}
