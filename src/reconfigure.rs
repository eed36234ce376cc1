//! Transform-order changes
//!
//! An order change replaces every frame-length-dependent buffer. The new set is
//! built by the controller on its own thread and handed to the processor over a
//! bounded channel; the processor swaps it in only between frames and hands the
//! old set back so that it is freed off the audio thread as well.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use log::{debug, warn};

use crate::{
    processor::TuningError,
    stft::{FrameBuffers, MAX_ORDER, MIN_ORDER},
};

/// Retired sets that can wait for collection before the audio thread frees
/// them itself.
const RETIRED_SLOTS: usize = 4;

/// Check that `order` is in `MIN_ORDER..=MAX_ORDER`.
pub fn validate_order(order: u32) -> Result<u32, TuningError> {
    if (MIN_ORDER..=MAX_ORDER).contains(&order) {
        Ok(order)
    } else {
        Err(TuningError::InvalidOrder {
            order,
            min: MIN_ORDER,
            max: MAX_ORDER,
        })
    }
}

/// Nearest supported order.
pub fn clamp_order(order: u32) -> u32 {
    order.clamp(MIN_ORDER, MAX_ORDER)
}

/// Requests order changes for one processor from a non-real-time thread.
///
/// Obtained from [`TuningProcessor::order_controller`](crate::TuningProcessor::order_controller).
/// Only the latest pending request is applied.
pub struct OrderController {
    staged_tx: Sender<FrameBuffers>,
    // Kept to drop a request the processor has not picked up yet.
    staged_rx: Receiver<FrameBuffers>,
    retired_rx: Receiver<FrameBuffers>,
}

impl OrderController {
    /// Build buffers for `order` and queue them for the processor. Any earlier
    /// request that has not been applied yet is discarded.
    ///
    /// Returns `Err(InvalidOrder)` for orders outside `MIN_ORDER..=MAX_ORDER`
    /// and `Err(ControllerDisconnected)` once the processor is gone.
    pub fn request(&self, order: u32) -> Result<(), TuningError> {
        let order = validate_order(order).inspect_err(|e| warn!("order request rejected: {e}"))?;
        self.collect_retired()?;

        while self.staged_rx.try_recv().is_ok() {
            debug!("dropping superseded order request");
        }

        let buffers = FrameBuffers::new(order);
        debug!(
            "staged order {order} ({} samples, {} bins)",
            buffers.frame_len(),
            buffers.num_bins()
        );
        self.staged_tx
            .send(buffers)
            .map_err(|_| TuningError::ControllerDisconnected)
    }

    /// True while a request is waiting for the processor to apply it.
    pub fn is_pending(&self) -> bool {
        !self.staged_rx.is_empty()
    }

    /// Free buffer sets the processor has swapped out. Returns how many were
    /// freed, or `Err(ControllerDisconnected)` if the processor has been dropped.
    pub fn collect_retired(&self) -> Result<usize, TuningError> {
        let mut freed = 0;
        loop {
            match self.retired_rx.try_recv() {
                Ok(_old) => freed += 1,
                Err(TryRecvError::Empty) => return Ok(freed),
                Err(TryRecvError::Disconnected) => {
                    return Err(TuningError::ControllerDisconnected)
                }
            }
        }
    }
}

/// Processor end of the order-change channels.
pub(crate) struct OrderSwap {
    staged_rx: Receiver<FrameBuffers>,
    retired_tx: Sender<FrameBuffers>,
}

impl OrderSwap {
    /// Next staged buffer set, if any. Never blocks.
    #[inline]
    pub(crate) fn poll(&self) -> Option<FrameBuffers> {
        self.staged_rx.try_recv().ok()
    }

    /// Hand a swapped-out set back to the controller. If nobody is collecting,
    /// it is dropped here.
    pub(crate) fn retire(&self, old: FrameBuffers) {
        let _ = self.retired_tx.try_send(old);
    }
}

/// Linked controller/processor channel pair.
pub(crate) fn order_channel() -> (OrderController, OrderSwap) {
    let (staged_tx, staged_rx) = bounded(1);
    let (retired_tx, retired_rx) = bounded(RETIRED_SLOTS);
    (
        OrderController {
            staged_tx,
            staged_rx: staged_rx.clone(),
            retired_rx,
        },
        OrderSwap {
            staged_rx,
            retired_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_range_is_enforced() {
        assert!(validate_order(MIN_ORDER).is_ok());
        assert!(validate_order(MAX_ORDER).is_ok());
        assert!(matches!(
            validate_order(MAX_ORDER + 1),
            Err(TuningError::InvalidOrder { order: 15, .. })
        ));
        assert_eq!(clamp_order(3), MIN_ORDER);
        assert_eq!(clamp_order(20), MAX_ORDER);
    }

    #[test]
    fn latest_request_wins() {
        let (controller, swap) = order_channel();
        controller.request(9).unwrap();
        controller.request(10).unwrap();
        assert!(controller.is_pending());
        let staged = swap.poll().unwrap();
        assert_eq!(staged.order(), 10);
        assert!(swap.poll().is_none());
    }

    #[test]
    fn retired_sets_are_collected() {
        let (controller, swap) = order_channel();
        swap.retire(FrameBuffers::new(MIN_ORDER));
        assert_eq!(controller.collect_retired().unwrap(), 1);
        drop(swap);
        assert!(matches!(
            controller.request(9),
            Err(TuningError::ControllerDisconnected)
        ));
    }
}
