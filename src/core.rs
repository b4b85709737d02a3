// Copyright 2016 PingCAP, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::info;

use crate::event::Event;
use crate::handler::EventHandler;

/// Period of the expiry sweeper's logical tick (§4.6).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Multiplexes the event-batch channel and the sweeper tick on one task, so
/// the label index and the four containers never need a lock -- they are
/// owned by `handler`, moved in here and touched from nowhere else. This is
/// the only caller that ever holds a `&mut EventHandler`.
///
/// Returns once `events` is closed (the shutdown signal per §5); any batch
/// already enqueued by that point is drained before returning.
pub async fn run_core(mut handler: EventHandler, mut events: mpsc::Receiver<Vec<Event>>) {
    let mut ticker = time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            batch = events.recv() => {
                match batch {
                    Some(batch) => handler.handle_all(&batch, Instant::now().into()),
                    None => {
                        info!("event channel closed, core shutting down");
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                handler.sweep(Instant::now().into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use prometheus::Registry;

    use crate::event::Event;
    use crate::mapping::NullMapper;
    use crate::self_metrics::SelfMetrics;

    use super::*;

    fn handler() -> EventHandler {
        let registry = Registry::new();
        let metrics = SelfMetrics::new(&registry).unwrap();
        EventHandler::new(&registry, Box::new(NullMapper::default()), metrics)
    }

    #[tokio::test]
    async fn returns_when_channel_closes() {
        let (tx, rx) = mpsc::channel(8);
        drop(tx);
        run_core(handler(), rx).await;
    }

    #[tokio::test]
    async fn drains_a_pending_batch_before_returning() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(vec![Event::Counter {
            name: "foo".into(),
            delta: 1.0,
            labels: HashMap::new(),
        }])
        .await
        .unwrap();
        drop(tx);

        // run_core owns the handler, so we can't inspect it afterwards --
        // this just asserts the task actually completes instead of
        // blocking forever once recv() observes the channel as closed.
        run_core(handler(), rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_tick_fires_on_the_virtual_clock() {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run_core(handler(), rx));
        time::advance(SWEEP_INTERVAL * 3).await;
        drop(tx);
        task.await.unwrap();
    }
}
