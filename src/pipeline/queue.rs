//! Tagged FIFO connecting two pipeline stations.

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

/// Position of an item in the utterance protocol.
///
/// Per utterance a producer pushes `Start`, any number of `Data`, then one
/// terminal tag: `End`, or `Abort` when the utterance is dropped. `Exit`
/// ends the stream for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Start,
    Data,
    End,
    Abort,
    Exit,
}

impl Tag {
    /// Tags that close an utterance.
    pub fn is_terminal(self) -> bool {
        matches!(self, Tag::End | Tag::Abort | Tag::Exit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem<T> {
    pub tag: Tag,
    pub data: T,
}

/// Unbounded single-producer single-consumer queue of tagged items.
///
/// `push` never blocks; `pop` blocks until an item is available. Both ends
/// live in one value shared by reference between the two stations, so the
/// channel can never disconnect while either side holds it.
#[derive(Debug)]
pub struct StatusQueue<T> {
    tx: Sender<QueueItem<T>>,
    rx: Receiver<QueueItem<T>>,
}

impl<T> StatusQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn push(&self, tag: Tag, data: T) {
        // Cannot fail: `self.rx` keeps the channel connected.
        if self.tx.send(QueueItem { tag, data }).is_err() {
            unreachable!("status queue receiver dropped while sender alive");
        }
    }

    /// Blocking pop, FIFO order.
    pub fn pop(&self) -> QueueItem<T> {
        match self.rx.recv() {
            Ok(item) => item,
            Err(_) => unreachable!("status queue sender dropped while receiver alive"),
        }
    }

    pub fn try_pop(&self) -> Option<QueueItem<T>> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Current depth.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drop everything buffered. Returns how many items were discarded, or
    /// `None` when an `Exit` was among them and the stream is over.
    pub fn clear(&self) -> Option<usize> {
        let mut dropped = 0;
        while let Some(item) = self.try_pop() {
            if item.tag == Tag::Exit {
                return None;
            }
            dropped += 1;
        }
        Some(dropped)
    }
}

impl<T> Default for StatusQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
