use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Quiet period before a re-filter is recomputed.
pub const REFILTER_DEBOUNCE: Duration = Duration::from_millis(250);

/// Explicit, cancellable debounce deadline. Each `trigger` pushes the deadline
/// out by the full delay, so a burst of triggers fires once.
#[derive(Debug)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn trigger(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    #[cfg(test)]
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Resolves once the pending deadline passes and clears it. Never resolves
    /// while nothing is scheduled. Safe to drop and re-create inside `select!`.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new(REFILTER_DEBOUNCE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// Tags each recomputation so that a response arriving after a newer request
/// was issued can be recognised and discarded.
#[derive(Debug, Default)]
pub struct LatestOnly {
    latest: u64,
}

impl LatestOnly {
    pub fn begin(&mut self) -> Ticket {
        self.latest += 1;
        Ticket(self.latest)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.latest
    }
}

/// Runs `fetch` on the most recent input once `inputs` has been quiet for
/// the timer's delay. A result reaches `on_result` only if no newer fetch
/// was started while it was in flight. Returns after the input channel
/// closes and every started fetch has finished.
pub async fn run_latest<T, F, Fut>(
    mut inputs: mpsc::UnboundedReceiver<String>,
    initial: Option<String>,
    mut timer: DebounceTimer,
    fetch: F,
    mut on_result: impl FnMut(T),
) where
    T: Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<(Ticket, T)>();
    let mut latest = LatestOnly::default();
    let mut input = initial.unwrap_or_default();
    let mut open = true;
    let mut in_flight = 0usize;

    timer.trigger();
    loop {
        tokio::select! {
            line = inputs.recv(), if open => match line {
                Some(text) => {
                    input = text;
                    timer.trigger();
                }
                None => open = false,
            },
            _ = timer.fired() => {
                let ticket = latest.begin();
                let task = fetch(input.clone());
                let tx = tx.clone();
                in_flight += 1;
                tokio::spawn(async move {
                    let _ = tx.send((ticket, task.await));
                });
            }
            Some((ticket, result)) = rx.recv() => {
                in_flight -= 1;
                if latest.is_current(ticket) {
                    on_result(result);
                } else {
                    debug!("discarding superseded result");
                }
            }
        }

        if !open && !timer.is_pending() && in_flight == 0 {
            break;
        }
    }
}
