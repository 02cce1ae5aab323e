use tokio::sync::watch;

/// Trigger side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side; clone freely into tasks.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) { self.tx.send_replace(true); }

    pub fn token(&self) -> CancelToken { CancelToken { rx: self.tx.subscribe() } }
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self { cancellation().1 }

    pub fn is_cancelled(&self) -> bool { *self.rx.borrow() }

    /// Resolves once cancelled; pends forever if the handle is dropped first.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_once_cancelled() {
        let (handle, mut token) = cancellation();
        assert!(!token.is_cancelled());
        let waiter = tokio::spawn(async move { token.cancelled().await });
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(handle.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn never_token_pends() {
        let mut token = CancelToken::never();
        assert!(tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await.is_err());
    }
}
