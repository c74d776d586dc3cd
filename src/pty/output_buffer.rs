/// Bounded hand-off between a backend's reader and `AsyncPty::read_output`
use tokio::sync::mpsc;

/// Chunks buffered between the OS reader and the session read pump
pub const OUTPUT_CHANNEL_CAPACITY: usize = 1024;

/// Create the channel a backend reader feeds and the buffer that drains it
pub fn output_channel() -> (mpsc::Sender<Vec<u8>>, OutputBuffer) {
    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
    (tx, OutputBuffer::new(rx))
}

/// Keeps the part of a chunk that did not fit the caller's buffer
pub struct OutputBuffer {
    rx: mpsc::Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl OutputBuffer {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            offset: 0,
        }
    }

    /// Copy the next available bytes into `buf`; `None` once every sender is gone
    /// and the remainder has been drained. Cancel safe.
    pub async fn read(&mut self, buf: &mut [u8]) -> Option<usize> {
        if buf.is_empty() {
            return Some(0);
        }
        if self.offset >= self.pending.len() {
            let chunk = self.rx.recv().await?;
            self.pending = chunk;
            self.offset = 0;
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Some(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn splits_chunks_larger_than_the_buffer() {
        let (tx, mut output) = output_channel();
        tx.send(b"hello world".to_vec()).await.unwrap();
        drop(tx);

        let mut buf = [0u8; 4];
        let mut collected = Vec::new();
        while let Some(n) = output.read(&mut buf).await {
            collected.extend_from_slice(&buf[..n]);
        }
        assert_eq!(collected, b"hello world");
    }

    #[tokio::test]
    async fn empty_chunks_read_as_zero_not_eof() {
        let (tx, mut output) = output_channel();
        tx.send(Vec::new()).await.unwrap();
        tx.send(b"x".to_vec()).await.unwrap();
        drop(tx);

        let mut buf = [0u8; 8];
        assert_eq!(output.read(&mut buf).await, Some(0));
        assert_eq!(output.read(&mut buf).await, Some(1));
        assert_eq!(output.read(&mut buf).await, None);
    }
}
