// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Periodic tasks with explicit handles.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Handle to a task started by [`start_periodic`].
///
/// Dropping the handle leaves the task running; cancel it explicitly.
pub struct PeriodicHandle {
    join: JoinHandle<()>,
    token: CancellationToken,
}

impl PeriodicHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token handed to each run; cancelled together with the handle.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel and wait until the current run has wound down.
    pub async fn stop(self) {
        self.token.cancel();
        self.join().await;
    }

    /// Wait for the task to end without cancelling it.
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            error!("Periodic task failed: {}", e);
        }
    }
}

/// Run `task` now and then every `period` until `parent` or the returned
/// handle is cancelled.
///
/// Runs never overlap: a run that outlasts the period delays the next one.
pub fn start_periodic<F, Fut>(
    period: Duration,
    parent: &CancellationToken,
    mut task: F,
) -> PeriodicHandle
where
    F: FnMut(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = parent.child_token();
    let task_token = token.clone();

    let join = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = task_token.cancelled() => break,
                _ = interval.tick() => task(task_token.clone()).await,
            }
        }

        debug!("Periodic task stopped");
    });

    PeriodicHandle { join, token }
}
