use bytes::Bytes;

/// In-flight state of one download.
///
/// Owned by the task running the download and dropped with it. Chunks are
/// kept in arrival order; their boundaries carry no meaning.
#[derive(Debug, Default)]
pub struct TransferSession {
    expected_size: Option<u64>,
    chunks: Vec<Bytes>,
    received_bytes: u64,
    reported: Option<u8>,
}

impl TransferSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expected_size(&self) -> Option<u64> {
        self.expected_size
    }

    pub fn set_expected_size(&mut self, size: u64) {
        self.expected_size = Some(size);
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn push(&mut self, chunk: Bytes) {
        self.received_bytes += chunk.len() as u64;
        self.chunks.push(chunk);
    }

    /// Percentage to report, or `None` while the size is unknown.
    ///
    /// Never lower than a previously returned value, even if the device
    /// announces a different size mid-transfer.
    pub fn progress(&mut self) -> Option<u8> {
        let current = percent(self.received_bytes, self.expected_size?);
        let next = self.reported.map_or(current, |prev| prev.max(current));
        self.reported = Some(next);
        Some(next)
    }

    /// Concatenate all chunks in arrival order.
    pub fn assemble(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.received_bytes as usize);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn into_text(self) -> String {
        decode_payload(&self.assemble())
    }
}

/// `round(received / expected * 100)`, clamped to 100.
pub fn percent(received: u64, expected: u64) -> u8 {
    if expected == 0 {
        return 100;
    }
    let pct = (received as f64 / expected as f64 * 100.0).round();
    pct.min(100.0) as u8
}

/// Turn a reassembled payload into text.
///
/// The device pads the final notification with NULs; trailing NULs are
/// trimmed, embedded ones removed, and invalid UTF-8 replaced.
pub fn decode_payload(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |idx| idx + 1);
    let cleaned: Vec<u8> = bytes[..end].iter().copied().filter(|&b| b != 0).collect();
    String::from_utf8_lossy(&cleaned).into_owned()
}
