use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;

use crate::server::Event;
use crate::transport::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// [`Scheduler`] backed by tokio sleeps. Expiry is posted as
/// [`Event::TimerFired`] on the shared event channel.
pub struct TokioScheduler {
    events: Sender<Event>,
    next_id: u64,
    pending: HashMap<TimerId, JoinHandle<()>>,
}

impl TokioScheduler {
    pub(crate) fn new(events: Sender<Event>) -> Self {
        Self {
            events,
            next_id: 0,
            pending: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    type Timer = TimerId;

    fn schedule_once(&mut self, delay: Duration) -> TimerId {
        self.pending.retain(|_, task| !task.is_finished());

        let id = TimerId(self.next_id);
        self.next_id += 1;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(Event::TimerFired(id)).await;
        });
        self.pending.insert(id, task);
        id
    }

    fn cancel(&mut self, timer: TimerId) {
        if let Some(task) = self.pending.remove(&timer) {
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.pending.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut scheduler = TokioScheduler::new(tx);
        let id = scheduler.schedule_once(Duration::from_millis(100));

        match rx.recv().await {
            Some(Event::TimerFired(fired)) => assert_eq!(fired, id),
            _ => panic!("expected timer event"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut scheduler = TokioScheduler::new(tx);
        let cancelled = scheduler.schedule_once(Duration::from_millis(50));
        let kept = scheduler.schedule_once(Duration::from_millis(100));
        scheduler.cancel(cancelled);

        match rx.recv().await {
            Some(Event::TimerFired(fired)) => assert_eq!(fired, kept),
            _ => panic!("expected timer event"),
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());
    }
}
