use std::sync::Arc;

use chatstream_core::chat::ChatError;
use tokio::sync::{mpsc, RwLock};

/// Builds the producer/consumer pair for one streaming call.
///
/// Both channels are bounded at a single slot: the body reader only gets ahead
/// of the consumer by one fragment, and a pre-stream error can be parked
/// before anyone is listening.
pub(crate) fn channel() -> (StreamSender, ResponseStream) {
    let (data_tx, data_rx) = mpsc::channel(1);
    let (err_tx, err_rx) = mpsc::channel(1);
    let sender = StreamSender {
        inner: Arc::new(RwLock::new(Some(Channels { data_tx, err_tx }))),
    };
    let stream = ResponseStream {
        data: data_rx,
        errors: err_rx,
    };
    (sender, stream)
}

struct Channels {
    data_tx: mpsc::Sender<String>,
    err_tx: mpsc::Sender<ChatError>,
}

/// Consumer half of a streaming call.
///
/// `data` carries content fragments in the order they were parsed; `errors`
/// carries at most one terminal error. Both channels close together when the
/// call ends, so a closed `data` channel with no error delivered means the
/// upstream finished cleanly.
pub struct ResponseStream {
    pub data: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<ChatError>,
}

impl ResponseStream {
    /// Races both channels. Pending fragments drain before a terminal error;
    /// `None` means the stream ended with nothing left to report.
    pub async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        tokio::select! {
            biased;
            Some(text) = self.data.recv() => Some(Ok(text)),
            err = self.errors.recv() => err.map(Err),
        }
    }
}

/// Producer half. The `None` state of `inner` is the closed flag: taking the
/// senders drops both channels together, at most once, and every later send
/// is a no-op.
#[derive(Clone)]
pub(crate) struct StreamSender {
    inner: Arc<RwLock<Option<Channels>>>,
}

impl StreamSender {
    /// Delivers one content fragment. Waits for the consumer to drain the
    /// slot; a fragment sent after close or after the consumer dropped its
    /// receiver is discarded.
    pub(crate) async fn send(&self, text: String) {
        let guard = self.inner.read().await;
        if let Some(ch) = guard.as_ref() {
            let _ = ch.data_tx.send(text).await;
        }
    }

    /// Delivers the terminal error and closes. Taking the senders first keeps
    /// a racing `send_error` from delivering a second value.
    pub(crate) async fn send_error(&self, err: ChatError) {
        let taken = self.inner.write().await.take();
        if let Some(ch) = taken {
            let _ = ch.err_tx.send(err).await;
        }
    }

    pub(crate) async fn close(&self) {
        self.inner.write().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_fragments_in_order() {
        let (tx, mut stream) = channel();
        let producer = tokio::spawn(async move {
            for part in ["a", "b", "c"] {
                tx.send(part.to_string()).await;
            }
            tx.close().await;
        });
        let mut got = Vec::new();
        while let Some(item) = stream.recv().await {
            got.push(item.expect("clean stream"));
        }
        producer.await.unwrap();
        assert_eq!(got, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn error_closes_and_silences_later_sends() {
        let (tx, mut stream) = channel();
        tx.send_error(ChatError::EmptyResponse).await;
        tx.send("late".to_string()).await;
        assert!(matches!(
            stream.recv().await,
            Some(Err(ChatError::EmptyResponse))
        ));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn only_first_error_is_delivered() {
        let (tx, mut stream) = channel();
        tx.send_error(ChatError::Canceled).await;
        tx.send_error(ChatError::EmptyResponse).await;
        assert!(matches!(stream.recv().await, Some(Err(ChatError::Canceled))));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_twice_is_a_no_op() {
        let (tx, mut stream) = channel();
        tx.close().await;
        tx.close().await;
        tx.send("x".to_string()).await;
        tx.send_error(ChatError::Canceled).await;
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn buffered_fragment_drains_before_error() {
        let (tx, mut stream) = channel();
        tx.send("tail".to_string()).await;
        tx.send_error(ChatError::Canceled).await;
        assert_eq!(stream.recv().await.unwrap().unwrap(), "tail");
        assert!(matches!(stream.recv().await, Some(Err(ChatError::Canceled))));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_consumer_does_not_block_the_producer() {
        let (tx, stream) = channel();
        drop(stream);
        tokio::time::timeout(Duration::from_secs(1), async {
            tx.send("a".to_string()).await;
            tx.send("b".to_string()).await;
            tx.send_error(ChatError::Canceled).await;
        })
        .await
        .expect("sends must not hang once the consumer is gone");
    }
}
