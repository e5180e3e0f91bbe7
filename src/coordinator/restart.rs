//! Lock-gated restart sequence

use super::{Coordination, CoordinationSession};
use crate::common::{Error, Result, SupervisorConfig};
use crate::discovery::EnsembleSnapshot;
use std::future::Future;
use std::time::Duration;

pub struct RestartCoordinator<C> {
    coordination: C,
    lock_path: String,
    lock_timeout: Option<Duration>,
}

impl<C: Coordination> RestartCoordinator<C> {
    pub fn new(coordination: C, lock_path: String) -> Self {
        Self {
            coordination,
            lock_path,
            lock_timeout: None,
        }
    }

    pub fn from_config(coordination: C, config: &SupervisorConfig) -> Result<Self> {
        Ok(Self::new(coordination, config.lock_path()?).with_lock_timeout(config.lock_timeout))
    }

    /// Fail instead of waiting forever for the lock
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_path(&self) -> &str {
        &self.lock_path
    }

    pub fn coordination(&self) -> &C {
        &self.coordination
    }

    /// Run `do_restart` while holding the fleet-wide restart lock.
    ///
    /// The session is opened against `ensemble` (the newly discovered one) and
    /// lives only for this call. Lock and session are released whichever way
    /// the call ends; the first error wins.
    pub async fn coordinate_restart<F, Fut, T>(
        &self,
        ensemble: &EnsembleSnapshot,
        do_restart: F,
    ) -> Result<T>
    where
        F: FnOnce(EnsembleSnapshot) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let mut session = self.coordination.connect(ensemble).await?;

        let result = self.locked(&mut session, ensemble, do_restart).await;

        if let Err(e) = session.close().await {
            tracing::warn!("Closing coordination session failed: {}", e);
        }
        result
    }

    async fn locked<F, Fut, T>(
        &self,
        session: &mut C::Session,
        ensemble: &EnsembleSnapshot,
        do_restart: F,
    ) -> Result<T>
    where
        F: FnOnce(EnsembleSnapshot) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let result = match self.acquire(session).await {
            Ok(()) => {
                tracing::info!("Restart lock acquired, restarting...");
                do_restart(ensemble.clone()).await
            }
            Err(e) => Err(e),
        };

        match (result, session.release().await) {
            (Ok(value), Ok(())) => {
                tracing::info!("Restart lock released");
                Ok(value)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), released) => {
                if let Err(release_err) = released {
                    tracing::warn!("Releasing restart lock failed: {}", release_err);
                }
                Err(e)
            }
        }
    }

    async fn acquire(&self, session: &mut C::Session) -> Result<()> {
        tracing::info!("Waiting for restart lock {}", self.lock_path);
        match self.lock_timeout {
            None => session.acquire(&self.lock_path).await,
            Some(timeout) => tokio::time::timeout(timeout, session.acquire(&self.lock_path))
                .await
                .map_err(|_| Error::LockTimeout(self.lock_path.clone()))?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Journal {
        events: Vec<String>,
    }

    struct FakeCoordination {
        journal: Arc<Mutex<Journal>>,
        fail_acquire: bool,
        block_acquire: bool,
    }

    struct FakeSession {
        journal: Arc<Mutex<Journal>>,
        fail_acquire: bool,
        block_acquire: bool,
    }

    impl FakeCoordination {
        fn new(journal: Arc<Mutex<Journal>>) -> Self {
            Self {
                journal,
                fail_acquire: false,
                block_acquire: false,
            }
        }
    }

    #[async_trait]
    impl Coordination for FakeCoordination {
        type Session = FakeSession;

        async fn connect(&self, ensemble: &EnsembleSnapshot) -> Result<FakeSession> {
            self.journal
                .lock()
                .unwrap()
                .events
                .push(format!("connect {}", ensemble.connection_string()));
            Ok(FakeSession {
                journal: self.journal.clone(),
                fail_acquire: self.fail_acquire,
                block_acquire: self.block_acquire,
            })
        }
    }

    #[async_trait]
    impl CoordinationSession for FakeSession {
        async fn acquire(&mut self, path: &str) -> Result<()> {
            if self.block_acquire {
                std::future::pending::<()>().await;
            }
            if self.fail_acquire {
                return Err(Error::Lock {
                    path: path.to_string(),
                    reason: "refused".into(),
                });
            }
            self.journal.lock().unwrap().events.push(format!("acquire {}", path));
            Ok(())
        }

        async fn release(&mut self) -> Result<()> {
            self.journal.lock().unwrap().events.push("release".into());
            Ok(())
        }

        async fn close(self) -> Result<()> {
            self.journal.lock().unwrap().events.push("close".into());
            Ok(())
        }
    }

    fn ensemble() -> EnsembleSnapshot {
        EnsembleSnapshot::from_addresses(["2.2.2.2:2181", "1.1.1.1:2181"])
    }

    #[tokio::test]
    async fn test_restart_runs_under_lock() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let coordinator =
            RestartCoordinator::new(FakeCoordination::new(journal.clone()), "/kafka-coord/x".into());

        let inner = journal.clone();
        let out = coordinator
            .coordinate_restart(&ensemble(), |e| async move {
                inner.lock().unwrap().events.push(format!("restart {}", e));
                Ok(7)
            })
            .await
            .unwrap();

        assert_eq!(out, 7);
        assert_eq!(
            journal.lock().unwrap().events,
            vec![
                "connect 1.1.1.1:2181,2.2.2.2:2181",
                "acquire /kafka-coord/x",
                "restart [1.1.1.1:2181,2.2.2.2:2181]",
                "release",
                "close",
            ]
        );
    }

    #[tokio::test]
    async fn test_lock_released_when_restart_fails() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let coordinator =
            RestartCoordinator::new(FakeCoordination::new(journal.clone()), "/kafka-coord/x".into());

        let err = coordinator
            .coordinate_restart(&ensemble(), |_| async move {
                Err::<(), _>(Error::Other("spawn failed".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Other(_)));
        let events = journal.lock().unwrap().events.clone();
        assert_eq!(&events[events.len() - 2..], ["release", "close"]);
    }

    #[tokio::test]
    async fn test_lock_failure_propagates() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut coordination = FakeCoordination::new(journal.clone());
        coordination.fail_acquire = true;
        let coordinator = RestartCoordinator::new(coordination, "/kafka-coord/x".into());

        let mut ran = false;
        let err = coordinator
            .coordinate_restart(&ensemble(), |_| {
                ran = true;
                async { Ok(()) }
            })
            .await
            .unwrap_err();

        assert!(!ran);
        assert!(err.is_coordination());
        assert!(journal.lock().unwrap().events.ends_with(&["release".into(), "close".into()]));
    }

    #[tokio::test]
    async fn test_lock_timeout() {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let mut coordination = FakeCoordination::new(journal.clone());
        coordination.block_acquire = true;
        let coordinator = RestartCoordinator::new(coordination, "/kafka-coord/x".into())
            .with_lock_timeout(Some(Duration::from_millis(20)));

        let err = coordinator
            .coordinate_restart(&ensemble(), |_| async { Ok(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LockTimeout(ref p) if p == "/kafka-coord/x"));
        assert_eq!(err.exit_code(), crate::common::EXIT_COORDINATION_FAILURE);
        assert!(journal.lock().unwrap().events.ends_with(&["release".into(), "close".into()]));
    }
}
