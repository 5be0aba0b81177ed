use crate::error::{ReaderError, Result};
use tokio::sync::broadcast;

/// Event emitted by a [`LineClient`](crate::LineClient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Socket established
    Connected,
    /// Previously established socket was lost
    Disconnected,
    /// One line received from the peer, terminator stripped
    Line(String),
}

/// Update pushed to the host UI
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiUpdate {
    /// New converted sensor value
    Sensor(f64),
    /// Actuator state as the controller sees it
    Actuator(bool),
}

/// Receiver for client events
pub type EventReceiver = Subscription<ClientEvent>;

/// Receiver for UI updates
pub type UpdateReceiver = Subscription<UiUpdate>;

/// Receiver side of a broadcast subscription.
///
/// A slow reader never sees an error for falling behind: items pushed out
/// of the channel before it caught up are skipped, counted in
/// [`missed`](Self::missed), and delivery resumes at the oldest retained
/// item. Only a closed channel is reported.
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
    missed: u64,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx, missed: 0 }
    }

    /// Receive the next item
    ///
    /// Returns `ConnectionClosed` once every sender has been dropped and the
    /// backlog is drained.
    pub async fn recv(&mut self) -> Result<T> {
        loop {
            match self.rx.recv().await {
                Ok(item) => return Ok(item),
                Err(broadcast::error::RecvError::Lagged(n)) => self.skip(n),
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ReaderError::ConnectionClosed)
                }
            }
        }
    }

    /// Try to receive an item without blocking
    ///
    /// Returns `None` if nothing is available.
    pub fn try_recv(&mut self) -> Result<Option<T>> {
        loop {
            match self.rx.try_recv() {
                Ok(item) => return Ok(Some(item)),
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.skip(n),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(ReaderError::ConnectionClosed)
                }
            }
        }
    }

    /// Total number of items skipped because this receiver fell behind
    pub fn missed(&self) -> u64 {
        self.missed
    }

    fn skip(&mut self, n: u64) {
        self.missed += n;
        tracing::debug!("subscriber fell behind, skipped {} items", n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_recv_reports_empty_then_items() {
        let (tx, rx) = broadcast::channel(4);
        let mut sub = Subscription::new(rx);

        assert!(matches!(sub.try_recv(), Ok(None)));
        tx.send(ClientEvent::Connected).unwrap();
        assert_eq!(sub.try_recv().unwrap(), Some(ClientEvent::Connected));
    }

    #[test]
    fn lagging_receiver_skips_to_oldest_retained() {
        let (tx, rx) = broadcast::channel(1);
        let mut sub = Subscription::new(rx);

        tx.send(UiUpdate::Sensor(1.0)).unwrap();
        tx.send(UiUpdate::Sensor(2.0)).unwrap();
        assert_eq!(sub.try_recv().unwrap(), Some(UiUpdate::Sensor(2.0)));
        assert_eq!(sub.missed(), 1);
        assert!(matches!(sub.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn recv_resumes_after_lag() {
        let (tx, rx) = broadcast::channel(2);
        let mut sub = Subscription::new(rx);

        for line in ["AV1", "AV2", "AV3", "AV4", "AV5"] {
            tx.send(ClientEvent::Line(line.to_string())).unwrap();
        }
        assert_eq!(sub.recv().await.unwrap(), ClientEvent::Line("AV4".into()));
        assert_eq!(sub.recv().await.unwrap(), ClientEvent::Line("AV5".into()));
        assert_eq!(sub.missed(), 3);
    }

    #[tokio::test]
    async fn recv_drains_backlog_before_reporting_close() {
        let (tx, rx) = broadcast::channel(4);
        let mut sub = Subscription::new(rx);

        tx.send(ClientEvent::Connected).unwrap();
        drop(tx);
        assert_eq!(sub.recv().await.unwrap(), ClientEvent::Connected);
        assert!(matches!(sub.recv().await, Err(ReaderError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn recv_fails_once_sender_is_gone() {
        let (tx, rx) = broadcast::channel::<ClientEvent>(1);
        let mut sub = Subscription::new(rx);
        drop(tx);
        assert!(matches!(sub.recv().await, Err(ReaderError::ConnectionClosed)));
    }
}
