//! Integration tests for the reconnection supervisor.
//!
//! Time is paused, so retry sleeps resolve as soon as the runtime is idle
//! and `Instant` differences measure exactly the configured intervals.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tabletop_client::{ClientError, ConnectionState, Connector, ReconnectionSupervisor};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

/// Fails every attempt until `up` is set.
struct Switch {
    up: Arc<std::sync::atomic::AtomicBool>,
    attempts: Arc<AtomicU32>,
}

impl Connector for Switch {
    type Connection = u32;

    async fn connect(&self) -> Result<u32, ClientError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.up.load(Ordering::SeqCst) {
            Ok(n)
        } else {
            Err(ClientError::Disconnected)
        }
    }
}

/// Fails the first `failures` attempts, then succeeds.
struct FailThenSucceed {
    failures: u32,
    attempts: AtomicU32,
}

impl Connector for FailThenSucceed {
    type Connection = u32;

    async fn connect(&self) -> Result<u32, ClientError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err(ClientError::Disconnected)
        } else {
            Ok(n)
        }
    }
}

const INTERVAL: Duration = Duration::from_secs(2);

// =========================================================================
// Retry loop
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_connect_retries_at_fixed_interval() {
    let supervisor = ReconnectionSupervisor::new(
        FailThenSucceed {
            failures: 3,
            attempts: AtomicU32::new(0),
        },
        INTERVAL,
    );

    let start = Instant::now();
    let attempt = supervisor.connect().await;

    assert_eq!(attempt, 4);
    assert_eq!(start.elapsed(), INTERVAL * 3);
    assert_eq!(supervisor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_try_connect_failure_leaves_disconnected() {
    let supervisor = ReconnectionSupervisor::new(
        FailThenSucceed {
            failures: 1,
            attempts: AtomicU32::new(0),
        },
        INTERVAL,
    );

    assert!(supervisor.try_connect().await.is_err());
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert_eq!(supervisor.try_connect().await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_keeps_retrying_until_server_returns() {
    let up = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let attempts = Arc::new(AtomicU32::new(0));
    let supervisor = Arc::new(ReconnectionSupervisor::new(
        Switch {
            up: Arc::clone(&up),
            attempts: Arc::clone(&attempts),
        },
        INTERVAL,
    ));

    let task = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move { supervisor.connect().await })
    };

    tokio::time::sleep(INTERVAL * 10).await;
    assert!(!task.is_finished());
    assert!(attempts.load(Ordering::SeqCst) >= 10);

    up.store(true, Ordering::SeqCst);
    task.await.unwrap();
    assert_eq!(supervisor.state(), ConnectionState::Connected);
}

// =========================================================================
// State observation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_state_changes_are_observable() {
    let supervisor = ReconnectionSupervisor::new(
        FailThenSucceed {
            failures: 0,
            attempts: AtomicU32::new(0),
        },
        INTERVAL,
    );
    let mut rx = supervisor.subscribe();
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Disconnected);

    supervisor.connect().await;
    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Connected);

    supervisor.mark_lost();
    assert_eq!(*rx.borrow_and_update(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_run_reconnects_after_session_ends() {
    let supervisor = ReconnectionSupervisor::new(
        FailThenSucceed {
            failures: 0,
            attempts: AtomicU32::new(0),
        },
        INTERVAL,
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let run = supervisor.run(|conn| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(conn);
        }
    });

    // Each session ends at once, so `run` reconnects every interval.
    let _ = tokio::time::timeout(INTERVAL * 3 - Duration::from_millis(1), run).await;

    let mut sessions = Vec::new();
    while let Ok(conn) = rx.try_recv() {
        sessions.push(conn);
    }
    assert_eq!(sessions, vec![1, 2, 3]);
}
