#[derive(Debug)]
struct PagePool {
    capacity: usize,
    pages: VecDeque<PageId>,
    closed: usize,
}

impl PagePool {
    fn new(capacity: usize) -> Self {
        PagePool {
            capacity: capacity.max(1),
            pages: VecDeque::new(),
            closed: 0,
        }
    }

    async fn acquire<C: BrowserContext + ?Sized>(&mut self, ctx: &mut C) -> Result<PageId, DriverError> {
        while self.pages.len() >= self.capacity {
            let Some(oldest) = self.pages.front().cloned() else {
                break;
            };
            debug!(page = %oldest, "closing oldest page to stay within {} open pages", self.capacity);
            self.close(ctx, &oldest).await;
            self.pages.pop_front();
        }
        let page = ctx.open_page().await?;
        self.pages.push_back(page.clone());
        debug!(page = %page, open = self.len(), "page acquired");
        Ok(page)
    }

    async fn release_all<C: BrowserContext + ?Sized>(&mut self, ctx: &mut C) {
        while let Some(page) = self.pages.front().cloned() {
            self.close(ctx, &page).await;
            self.pages.pop_front();
        }
    }

    async fn close<C: BrowserContext + ?Sized>(&mut self, ctx: &mut C, page: &PageId) {
        if let Err(err) = ctx.close_page(page).await {
            warn!(page = %page, "failed to close page: {err}");
        }
        self.closed += 1;
    }

    fn len(&self) -> usize {
        self.pages.len()
    }

    fn closed(&self) -> usize {
        self.closed
    }
}

#[cfg(test)]
mod pool_tests {
    use super::testing::{Call, MockBrowser};
    use super::*;

    #[tokio::test]
    async fn pool_never_exceeds_capacity_and_evicts_fifo() {
        let browser = MockBrowser::new();
        let mut ctx = browser.launch(Path::new("/tmp/p")).await.unwrap();
        let mut pool = PagePool::new(3);

        let mut opened = Vec::new();
        for _ in 0..7 {
            opened.push(pool.acquire(&mut ctx).await.unwrap());
            assert!(pool.len() <= 3);
        }
        assert_eq!(pool.closed(), 4);
        let closed = browser
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ClosePage(page) => Some(page),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(closed, opened[..4].to_vec());

        pool.release_all(&mut ctx).await;
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.closed(), 7);
        assert_eq!(browser.double_closes(), 0);
        assert!(browser.open_pages().is_empty());
    }

    #[tokio::test]
    async fn zero_capacity_is_treated_as_one() {
        let browser = MockBrowser::new();
        let mut ctx = browser.launch(Path::new("/tmp/p")).await.unwrap();
        let mut pool = PagePool::new(0);
        pool.acquire(&mut ctx).await.unwrap();
        pool.acquire(&mut ctx).await.unwrap();
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.closed(), 1);
    }

    #[tokio::test]
    async fn failed_close_still_leaves_the_pool() {
        let browser = MockBrowser::new();
        let mut ctx = browser.launch(Path::new("/tmp/p")).await.unwrap();
        let mut pool = PagePool::new(1);
        let first = pool.acquire(&mut ctx).await.unwrap();
        browser.forget_page(&first);
        pool.acquire(&mut ctx).await.unwrap();
        assert_eq!(pool.len(), 1);
        pool.release_all(&mut ctx).await;
        assert!(browser.open_pages().is_empty());
    }
}
