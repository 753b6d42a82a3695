//! Supervisor: starts configured components in order, holds the shared
//! shutdown signal, and stops launched components in reverse order within a
//! per-component grace window (§4.9).

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ComponentError;

const STOP_GRACE: Duration = Duration::from_secs(2);

/// A component's lifecycle state. Transitions only move forward; `stop()`
/// is a no-op on a component that never reached `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    New,
    Loading,
    Running,
    Stopping,
    Stopped,
}

impl ComponentState {
    fn from_code(code: u8) -> Self {
        match code {
            0 => ComponentState::New,
            1 => ComponentState::Loading,
            2 => ComponentState::Running,
            3 => ComponentState::Stopping,
            _ => ComponentState::Stopped,
        }
    }

    fn code(self) -> u8 {
        match self {
            ComponentState::New => 0,
            ComponentState::Loading => 1,
            ComponentState::Running => 2,
            ComponentState::Stopping => 3,
            ComponentState::Stopped => 4,
        }
    }
}

/// A unit the Supervisor can start and stop. Implementations are expected
/// to spawn their own background work from `start` and return promptly;
/// `stop` awaits that work's completion.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    fn state(&self) -> ComponentState;
    async fn start(&self, shutdown: CancellationToken) -> Result<(), ComponentError>;
    async fn stop(&self) -> Result<(), ComponentError>;
}

type RunFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Runner = Box<dyn Fn(CancellationToken) -> RunFuture + Send + Sync>;

/// Adapts any `Fn(CancellationToken) -> impl Future<Output = ()>` into a
/// [`Component`]: spawns the future on `start`, joins it (within
/// [`STOP_GRACE`]) on `stop`.
pub struct LoopComponent {
    name: String,
    state: AtomicU8,
    handle: Mutex<Option<JoinHandle<()>>>,
    runner: Runner,
}

impl LoopComponent {
    pub fn new<F, Fut>(name: impl Into<String>, runner: F) -> Arc<Self>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Arc::new(Self {
            name: name.into(),
            state: AtomicU8::new(ComponentState::New.code()),
            handle: Mutex::new(None),
            runner: Box::new(move |shutdown| Box::pin(runner(shutdown))),
        })
    }

    fn set_state(&self, state: ComponentState) {
        self.state.store(state.code(), Ordering::Relaxed);
    }
}

#[async_trait]
impl Component for LoopComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        ComponentState::from_code(self.state.load(Ordering::Relaxed))
    }

    async fn start(&self, shutdown: CancellationToken) -> Result<(), ComponentError> {
        self.set_state(ComponentState::Loading);
        let future = (self.runner)(shutdown);
        let handle = tokio::spawn(future);
        *self.handle.lock().await = Some(handle);
        self.set_state(ComponentState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        self.set_state(ComponentState::Stopping);
        let handle = self.handle.lock().await.take();
        let Some(handle) = handle else {
            self.set_state(ComponentState::Stopped);
            return Ok(());
        };

        match tokio::time::timeout(STOP_GRACE, handle).await {
            Ok(Ok(())) => {
                self.set_state(ComponentState::Stopped);
                Ok(())
            }
            Ok(Err(join_err)) => {
                self.set_state(ComponentState::Stopped);
                Err(ComponentError::StopFailed(
                    self.name.clone(),
                    join_err.to_string(),
                ))
            }
            Err(_) => Err(ComponentError::StopTimedOut(self.name.clone())),
        }
    }
}

/// Owns the process-wide shutdown signal and the ordered set of components
/// configured for this run.
pub struct Conductor {
    shutdown: CancellationToken,
    components: Vec<Arc<dyn Component>>,
    launched: Mutex<Vec<Arc<dyn Component>>>,
}

impl Conductor {
    pub fn new(components: Vec<Arc<dyn Component>>) -> Self {
        Self {
            shutdown: CancellationToken::new(),
            components,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Starts every configured component in order. A component that fails
    /// to start is logged and skipped; the rest still start.
    pub async fn start(&self) {
        let mut launched = self.launched.lock().await;
        for component in &self.components {
            match component.start(self.shutdown.clone()).await {
                Ok(()) => {
                    info!(component = component.name(), "component started");
                    launched.push(Arc::clone(component));
                }
                Err(err) => {
                    error!(component = component.name(), %err, "component failed to start");
                }
            }
        }
    }

    /// Trips the shared shutdown signal, then stops launched components in
    /// reverse start order, each within its own grace window. Returns
    /// `true` if every launched component reached a terminal state.
    pub async fn stop(&self) -> bool {
        self.shutdown.cancel();
        let launched = self.launched.lock().await;
        let mut all_clean = true;

        for component in launched.iter().rev() {
            if let Err(err) = component.stop().await {
                error!(component = component.name(), %err, "component did not stop cleanly");
                all_clean = false;
            }

            match component.state() {
                ComponentState::Stopped | ComponentState::Stopping => {}
                other => {
                    warn!(
                        component = component.name(),
                        state = ?other,
                        "component left a non-terminal state after stop"
                    );
                    all_clean = false;
                }
            }
        }

        all_clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn starts_and_stops_a_single_component() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = Arc::clone(&ran);
        let component = LoopComponent::new("probe", move |shutdown| {
            let ran = Arc::clone(&ran_clone);
            async move {
                ran.fetch_add(1, Ordering::Relaxed);
                shutdown.cancelled().await;
            }
        });

        let conductor = Conductor::new(vec![component.clone() as Arc<dyn Component>]);
        conductor.start().await;
        assert_eq!(component.state(), ComponentState::Running);

        let clean = conductor.stop().await;
        assert!(clean);
        assert_eq!(component.state(), ComponentState::Stopped);
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn stops_launched_components_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let make = |name: &'static str, order: Arc<Mutex<Vec<&'static str>>>| {
            LoopComponent::new(name, move |shutdown| {
                let order = Arc::clone(&order);
                async move {
                    shutdown.cancelled().await;
                    order.lock().await.push(name);
                }
            })
        };

        let first = make("first", Arc::clone(&order));
        let second = make("second", Arc::clone(&order));

        let conductor = Conductor::new(vec![
            first.clone() as Arc<dyn Component>,
            second.clone() as Arc<dyn Component>,
        ]);
        conductor.start().await;
        conductor.stop().await;

        assert_eq!(*order.lock().await, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn component_stuck_past_its_grace_window_is_reported() {
        let component = LoopComponent::new("stuck", |_shutdown| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let conductor = Conductor::new(vec![component as Arc<dyn Component>]);
        conductor.start().await;

        let start = tokio::time::Instant::now();
        let clean = tokio::time::timeout(Duration::from_secs(5), conductor.stop())
            .await
            .expect("stop() itself should not hang past the grace window");
        assert!(!clean);
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
