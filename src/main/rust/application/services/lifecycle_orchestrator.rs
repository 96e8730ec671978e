use std::sync::Arc;
use std::time::Duration;

use tokio::task::{AbortHandle, JoinError, JoinHandle};

use super::ConnectionSupervisor;

/// Runs the supervisor on a background task and shuts it down within a
/// bounded grace period.
pub struct LifecycleOrchestrator {
    supervisor: Arc<ConnectionSupervisor>,
    grace_period: Duration,
    task: Option<JoinHandle<()>>,
}

impl LifecycleOrchestrator {
    pub fn new(supervisor: Arc<ConnectionSupervisor>, grace_period: Duration) -> Self {
        Self {
            supervisor,
            grace_period,
            task: None,
        }
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Spawn `supervisor.start()`. A second call while the task is alive
    /// returns the existing handle.
    pub fn start_background(&mut self) -> AbortHandle {
        if let Some(task) = &self.task {
            if !task.is_finished() {
                return task.abort_handle();
            }
        }

        let supervisor = self.supervisor.clone();
        let task = tokio::spawn(async move { supervisor.start().await });
        let handle = task.abort_handle();
        self.task = Some(task);

        tracing::info!("Broadcaster started in background");
        handle
    }

    /// Stop the supervisor, wait for the task, abort it if it lingers
    pub async fn stop_background(&mut self) {
        if tokio::time::timeout(self.grace_period, self.supervisor.stop())
            .await
            .is_err()
        {
            tracing::warn!("Supervisor stop did not finish within {:?}", self.grace_period);
        }

        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(self.grace_period, &mut task).await {
            Ok(result) => Self::log_exit(result),
            Err(_) => {
                tracing::warn!(
                    "Background task still running after {:?}, cancelling",
                    self.grace_period
                );
                task.abort();
                Self::log_exit(task.await);
            }
        }
    }

    fn log_exit(result: Result<(), JoinError>) {
        match result {
            Ok(()) => tracing::info!("Background task finished"),
            Err(e) if e.is_cancelled() => tracing::info!("Background task cancelled"),
            Err(e) => tracing::error!("Background task failed: {}", e),
        }
    }
}
