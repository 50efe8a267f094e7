//! In-process transfers: sender and receiver joined by a memory channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use blobwire_core::{
    AdapterStats, AssetSink, ChannelAdapter, ChannelKind, ChunkPump, PumpConfig, RecordingInfo,
};
use blobwire_transport::{
    IMAGE_CHANNEL_LABEL, MemoryChannel, MessageChannel, VIDEO_CHANNEL_LABEL, memory_channel,
};

/// Result of one loopback transfer
#[derive(Debug, Clone)]
pub struct TransferSummary {
    /// Frames carrying asset bytes
    pub chunks: u32,
    /// Blobs sent (video only)
    pub blobs: u32,
    /// Receiver counters
    pub receiver: AdapterStats,
    /// Wall time of the transfer
    pub elapsed: Duration,
}

/// Send `bytes` as one image and reassemble it into `sink`.
///
/// # Errors
///
/// Returns an error if the pump rejects the configuration or the transfer
/// fails.
pub async fn transfer_image(
    config: PumpConfig,
    asset_key: &str,
    bytes: &[u8],
    sink: Arc<dyn AssetSink>,
) -> anyhow::Result<TransferSummary> {
    let adapter = ChannelAdapter::new(sink);
    let (channel, mut source) = memory_channel(IMAGE_CHANNEL_LABEL);
    let pump = ChunkPump::new(Arc::new(channel), config)?;
    let started = Instant::now();

    let send = async {
        let result = pump.send_image(asset_key, bytes).await;
        pump.channel().close().await?;
        Ok::<_, anyhow::Error>(result?)
    };
    let (sent, _) = tokio::join!(send, adapter.serve(ChannelKind::Image, &mut source));
    let chunks = sent.context("image transfer failed")?;

    Ok(TransferSummary {
        chunks,
        blobs: 0,
        receiver: adapter.stats(),
        elapsed: started.elapsed(),
    })
}

/// Stream `bytes` as a recording of `blob_size` blobs and finalize it into
/// `sink`. `on_blob` is called with the length of each blob once sent.
///
/// # Errors
///
/// Returns an error for a zero blob size, an invalid configuration, or a
/// failed transfer.
pub async fn transfer_video<F>(
    config: PumpConfig,
    info: RecordingInfo,
    bytes: &[u8],
    blob_size: usize,
    sink: Arc<dyn AssetSink>,
    on_blob: F,
) -> anyhow::Result<TransferSummary>
where
    F: Fn(u64),
{
    if blob_size == 0 {
        anyhow::bail!("Blob size must be greater than zero");
    }

    let adapter = ChannelAdapter::new(sink);
    let (channel, mut source) = memory_channel(VIDEO_CHANNEL_LABEL);
    let pump = ChunkPump::new(Arc::new(channel), config)?;
    let started = Instant::now();

    let send = async {
        let result = stream_blobs(&pump, info, bytes, blob_size, &on_blob).await;
        pump.channel().close().await?;
        result
    };
    let (sent, _) = tokio::join!(send, adapter.serve(ChannelKind::Video, &mut source));
    let (chunks, blobs) = sent.context("video transfer failed")?;

    Ok(TransferSummary {
        chunks,
        blobs,
        receiver: adapter.stats(),
        elapsed: started.elapsed(),
    })
}

async fn stream_blobs<F: Fn(u64)>(
    pump: &ChunkPump<MemoryChannel>,
    info: RecordingInfo,
    bytes: &[u8],
    blob_size: usize,
    on_blob: &F,
) -> anyhow::Result<(u32, u32)> {
    let mut stream = pump.begin_recording(info).await?;

    let mut chunks = 0;
    for blob in bytes.chunks(blob_size) {
        chunks += stream.push_blob(blob).await?;
        on_blob(blob.len() as u64);
    }

    let blobs = stream.finish().await?;
    Ok((chunks, blobs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::DirectorySink;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    fn small_chunks() -> PumpConfig {
        PumpConfig {
            chunk_size: 1024,
            poll_interval: Duration::from_millis(1),
            ..PumpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_image_loopback_writes_file() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(DirectorySink::new(dir.path()).unwrap());
        let bytes: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let summary = transfer_image(small_chunks(), "cam-front", &bytes, sink.clone())
            .await
            .unwrap();

        assert_eq!(summary.chunks, 10);
        assert_eq!(summary.receiver.images_completed, 1);
        assert_eq!(summary.receiver.frames_malformed, 0);

        let written = sink.written();
        assert_eq!(written, vec![dir.path().join("cam-front.bin")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_empty_image_fails() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(DirectorySink::new(dir.path()).unwrap());

        assert!(transfer_image(small_chunks(), "cam", &[], sink.clone())
            .await
            .is_err());
        assert!(sink.written().is_empty());
    }

    #[tokio::test]
    async fn test_video_loopback_writes_file() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(DirectorySink::new(dir.path()).unwrap());
        let bytes: Vec<u8> = (0..50_000u32).map(|i| (i % 241) as u8).collect();
        let progressed = AtomicU64::new(0);

        let summary = transfer_video(
            small_chunks(),
            RecordingInfo::new("rec-1", "cam-rear", "video/webm"),
            &bytes,
            8 * 1024,
            sink.clone(),
            |n| {
                progressed.fetch_add(n, Ordering::Relaxed);
            },
        )
        .await
        .unwrap();

        assert_eq!(summary.blobs, 7);
        assert_eq!(summary.receiver.recordings_finalized, 1);
        assert_eq!(progressed.load(Ordering::Relaxed), bytes.len() as u64);

        let path = dir.path().join("cam-rear.webm");
        assert_eq!(sink.written(), vec![path.clone()]);
        assert_eq!(std::fs::read(path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn test_zero_blob_size_rejected() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(DirectorySink::new(dir.path()).unwrap());

        let result = transfer_video(
            small_chunks(),
            RecordingInfo::new("rec", "cam", "video/mp4"),
            b"data",
            0,
            sink,
            |_| {},
        )
        .await;
        assert!(result.is_err());
    }
}
