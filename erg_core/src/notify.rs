//! Row-change notifications toward the protocol side.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use erg_traits::TableObserver;

/// Forwards changed row indexes over a bounded channel. Never blocks: when
/// the receiver lags and the channel is full the notification is dropped.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<usize>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> (Self, Receiver<usize>) {
        let (tx, rx) = bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl TableObserver for ChannelObserver {
    fn table_row_changed(&self, row: usize) {
        match self.tx.try_send(row) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!(target: "power_table", row, "row notification dropped (full)");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
