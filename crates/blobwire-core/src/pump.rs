//! Sender-side chunk pump.
//!
//! Splits an asset into fixed-size chunks, frames each one and pushes the
//! frames through a [`MessageChannel`] in ascending index order. Before
//! every send the pump waits until the channel's buffered amount is below
//! the high-water mark for the asset kind. There is no acknowledgement,
//! reordering or retry: the first transport error aborts the asset.

use std::sync::Arc;
use std::time::Duration;

use blobwire_transport::{MessageChannel, TransportError};
use tracing::{debug, info};

use crate::error::{ConfigError, PumpError};
use crate::frame::{FrameHeader, ImageHeader, VideoHeader, encode_frame, encode_header};
use crate::{
    DEFAULT_CHUNK_SIZE, DEFAULT_IMAGE_HIGH_WATER_MARK, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_VIDEO_HIGH_WATER_MARK, MAX_CHUNK_SIZE,
};

/// Asset kind, selecting the backpressure mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Still image
    Image,
    /// Video recording
    Video,
}

impl AssetKind {
    /// Lowercase name used in logs and errors
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

/// Chunking and backpressure parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpConfig {
    /// Payload bytes per chunk (the last chunk may be shorter)
    pub chunk_size: usize,
    /// Buffered-amount threshold for image frames
    pub image_high_water_mark: usize,
    /// Buffered-amount threshold for video frames
    pub video_high_water_mark: usize,
    /// Delay between buffered-amount polls
    pub poll_interval: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            image_high_water_mark: DEFAULT_IMAGE_HIGH_WATER_MARK,
            video_high_water_mark: DEFAULT_VIDEO_HIGH_WATER_MARK,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl PumpConfig {
    /// Check the parameters can drive a transfer.
    ///
    /// # Errors
    ///
    /// Returns the first offending parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize {
                actual: self.chunk_size,
                max: MAX_CHUNK_SIZE,
            });
        }
        if self.image_high_water_mark == 0 {
            return Err(ConfigError::InvalidHighWaterMark {
                kind: AssetKind::Image.as_str(),
            });
        }
        if self.video_high_water_mark == 0 {
            return Err(ConfigError::InvalidHighWaterMark {
                kind: AssetKind::Video.as_str(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidPollInterval);
        }
        Ok(())
    }

    /// High-water mark for an asset kind
    pub fn high_water_mark(&self, kind: AssetKind) -> usize {
        match kind {
            AssetKind::Image => self.image_high_water_mark,
            AssetKind::Video => self.video_high_water_mark,
        }
    }
}

/// Identity of a recording on the sending side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingInfo {
    /// Recording identifier
    pub recording_id: String,
    /// Storage key of the finished recording
    pub asset_key: String,
    /// Container MIME type
    pub mime_type: String,
}

impl RecordingInfo {
    /// Describe a recording
    pub fn new(
        recording_id: impl Into<String>,
        asset_key: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            recording_id: recording_id.into(),
            asset_key: asset_key.into(),
            mime_type: mime_type.into(),
        }
    }
}

/// Frames assets and sends them through a channel under backpressure
pub struct ChunkPump<C: MessageChannel + ?Sized> {
    channel: Arc<C>,
    config: PumpConfig,
}

impl<C: MessageChannel + ?Sized> ChunkPump<C> {
    /// Create a pump over an open channel.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `config` fails validation.
    pub fn new(channel: Arc<C>, config: PumpConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { channel, config })
    }

    /// Channel the pump sends through
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Pump parameters
    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    /// Send one image, returning the number of chunks sent.
    ///
    /// # Errors
    ///
    /// - `PumpError::EmptyAsset` for zero bytes
    /// - `PumpError::Frame` if a header would not fit; nothing is sent
    /// - `PumpError::Transport` if the channel fails; later chunks are not sent
    pub async fn send_image(&self, asset_key: &str, bytes: &[u8]) -> Result<u32, PumpError> {
        if bytes.is_empty() {
            return Err(PumpError::EmptyAsset);
        }

        let total = self
            .pump_chunks(AssetKind::Image, bytes, |index, total| {
                ImageHeader::new(asset_key, index, total)
            })
            .await?;

        info!(asset_key, bytes = bytes.len(), chunks = total, "image sent");
        Ok(total)
    }

    /// Send the `start` frame of a recording.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::Frame` on header overflow, `PumpError::Transport`
    /// on channel failure.
    pub async fn start_recording(&self, info: &RecordingInfo) -> Result<(), PumpError> {
        let header = VideoHeader::start(&info.recording_id, &info.asset_key, &info.mime_type);
        self.send_control(&header).await?;
        info!(
            recording_id = %info.recording_id,
            asset_key = %info.asset_key,
            "recording start sent"
        );
        Ok(())
    }

    /// Send one blob of a recording, returning the number of chunks sent.
    ///
    /// An empty blob sends nothing and returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Same conditions as [`send_image`](Self::send_image), except that an
    /// empty blob is not an error.
    pub async fn send_blob(
        &self,
        info: &RecordingInfo,
        blob_index: u32,
        bytes: &[u8],
    ) -> Result<u32, PumpError> {
        if bytes.is_empty() {
            debug!(recording_id = %info.recording_id, blob_index, "skipping empty blob");
            return Ok(0);
        }

        let total = self
            .pump_chunks(AssetKind::Video, bytes, |index, total| {
                VideoHeader::data(
                    &info.recording_id,
                    &info.asset_key,
                    &info.mime_type,
                    blob_index,
                    index,
                    total,
                )
            })
            .await?;

        debug!(
            recording_id = %info.recording_id,
            blob_index,
            bytes = bytes.len(),
            chunks = total,
            "blob sent"
        );
        Ok(total)
    }

    /// Send the `stop` frame of a recording.
    ///
    /// # Errors
    ///
    /// Returns `PumpError::Frame` on header overflow, `PumpError::Transport`
    /// on channel failure.
    pub async fn stop_recording(&self, recording_id: &str) -> Result<(), PumpError> {
        self.send_control(&VideoHeader::stop(recording_id)).await?;
        info!(recording_id, "recording stop sent");
        Ok(())
    }

    /// Send the `start` frame and return a stream assigning blob indices.
    ///
    /// # Errors
    ///
    /// Same as [`start_recording`](Self::start_recording).
    pub async fn begin_recording(
        &self,
        info: RecordingInfo,
    ) -> Result<RecordingStream<'_, C>, PumpError> {
        self.start_recording(&info).await?;
        Ok(RecordingStream {
            pump: self,
            info,
            next_blob: 0,
        })
    }

    async fn send_control(&self, header: &VideoHeader) -> Result<(), PumpError> {
        let frame = encode_frame(header, &[])?;
        self.wait_for_drain(AssetKind::Video).await?;
        self.channel.send(&frame).await?;
        Ok(())
    }

    async fn pump_chunks<H, F>(
        &self,
        kind: AssetKind,
        bytes: &[u8],
        make_header: F,
    ) -> Result<u32, PumpError>
    where
        H: FrameHeader,
        F: Fn(u32, u32) -> H,
    {
        let total = self.chunk_count(bytes.len())?;

        // The last index has the most digits, so it serializes longest.
        encode_header(&make_header(total - 1, total))?;

        for (index, chunk) in (0..total).zip(bytes.chunks(self.config.chunk_size)) {
            let frame = encode_frame(&make_header(index, total), chunk)?;
            self.wait_for_drain(kind).await?;
            self.channel.send(&frame).await?;
            debug!(
                channel = self.channel.label(),
                chunk_index = index,
                total_chunks = total,
                len = chunk.len(),
                "chunk sent"
            );
        }

        Ok(total)
    }

    fn chunk_count(&self, len: usize) -> Result<u32, PumpError> {
        let count = len.div_ceil(self.config.chunk_size);
        u32::try_from(count).map_err(|_| PumpError::TooManyChunks { len })
    }

    /// Block until the channel's backlog is below the mark for `kind`.
    async fn wait_for_drain(&self, kind: AssetKind) -> Result<(), PumpError> {
        let high_water = self.config.high_water_mark(kind);
        let mut stalled = false;

        loop {
            if self.channel.is_closed() {
                return Err(TransportError::Closed.into());
            }

            let buffered = self.channel.buffered_amount().await;
            if buffered < high_water {
                if stalled {
                    debug!(channel = self.channel.label(), buffered, "backlog drained");
                }
                return Ok(());
            }

            if !stalled {
                debug!(
                    channel = self.channel.label(),
                    buffered,
                    high_water,
                    "applying backpressure"
                );
                stalled = true;
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// A recording in progress on the sending side.
///
/// Blob indices are issued in order starting at zero; empty blobs do not
/// consume an index.
pub struct RecordingStream<'a, C: MessageChannel + ?Sized> {
    pump: &'a ChunkPump<C>,
    info: RecordingInfo,
    next_blob: u32,
}

impl<C: MessageChannel + ?Sized> RecordingStream<'_, C> {
    /// Recording this stream feeds
    pub fn info(&self) -> &RecordingInfo {
        &self.info
    }

    /// Number of blobs sent so far
    pub fn blobs_sent(&self) -> u32 {
        self.next_blob
    }

    /// Send the next blob, returning the number of chunks sent.
    ///
    /// # Errors
    ///
    /// See [`ChunkPump::send_blob`].
    pub async fn push_blob(&mut self, bytes: &[u8]) -> Result<u32, PumpError> {
        let sent = self.pump.send_blob(&self.info, self.next_blob, bytes).await?;
        if sent > 0 {
            self.next_blob += 1;
        }
        Ok(sent)
    }

    /// Send the `stop` frame, returning the number of blobs sent.
    ///
    /// # Errors
    ///
    /// See [`ChunkPump::stop_recording`].
    pub async fn finish(self) -> Result<u32, PumpError> {
        self.pump.stop_recording(&self.info.recording_id).await?;
        Ok(self.next_blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::frame::{Frame, VideoAction};
    use blobwire_transport::{
        MemoryChannel, MemoryReceiver, memory_channel, memory_channel_with_limit,
    };

    fn config(chunk_size: usize) -> PumpConfig {
        PumpConfig {
            chunk_size,
            poll_interval: Duration::from_millis(2),
            ..PumpConfig::default()
        }
    }

    fn pump(chunk_size: usize) -> (ChunkPump<MemoryChannel>, MemoryReceiver) {
        let (channel, rx) = memory_channel("image");
        let pump = ChunkPump::new(Arc::new(channel), config(chunk_size)).unwrap();
        (pump, rx)
    }

    fn drain(rx: &mut MemoryReceiver) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| rx.try_recv()).collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(PumpConfig::default().validate().is_ok());

        let zero_chunk = PumpConfig {
            chunk_size: 0,
            ..PumpConfig::default()
        };
        assert_eq!(
            zero_chunk.validate(),
            Err(ConfigError::InvalidChunkSize {
                actual: 0,
                max: MAX_CHUNK_SIZE
            })
        );

        let huge_chunk = PumpConfig {
            chunk_size: MAX_CHUNK_SIZE + 1,
            ..PumpConfig::default()
        };
        assert!(huge_chunk.validate().is_err());

        let no_mark = PumpConfig {
            video_high_water_mark: 0,
            ..PumpConfig::default()
        };
        assert_eq!(
            no_mark.validate(),
            Err(ConfigError::InvalidHighWaterMark { kind: "video" })
        );

        let no_poll = PumpConfig {
            poll_interval: Duration::ZERO,
            ..PumpConfig::default()
        };
        assert_eq!(no_poll.validate(), Err(ConfigError::InvalidPollInterval));

        let (channel, _rx) = memory_channel("image");
        assert!(ChunkPump::new(Arc::new(channel), zero_chunk).is_err());
    }

    #[test]
    fn test_default_marks_favor_video() {
        let config = PumpConfig::default();
        assert!(
            config.high_water_mark(AssetKind::Image) < config.high_water_mark(AssetKind::Video)
        );
    }

    #[tokio::test]
    async fn test_send_image_chunks_in_order() {
        let (pump, mut rx) = pump(4);

        assert_eq!(pump.send_image("cam", b"0123456789").await.unwrap(), 3);

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 3);

        let expected: [&[u8]; 3] = [b"0123", b"4567", b"89"];
        for (i, (frame, want)) in frames.iter().zip(expected).enumerate() {
            let parsed = Frame::<ImageHeader>::parse(frame).unwrap();
            assert_eq!(parsed.header(), &ImageHeader::new("cam", i as u32, 3));
            assert_eq!(parsed.payload(), want);
        }
    }

    #[tokio::test]
    async fn test_exact_multiple_of_chunk_size() {
        let (pump, mut rx) = pump(5);
        assert_eq!(pump.send_image("cam", &[7u8; 10]).await.unwrap(), 2);
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[tokio::test]
    async fn test_empty_image_rejected() {
        let (pump, mut rx) = pump(4);
        assert!(matches!(
            pump.send_image("cam", &[]).await,
            Err(PumpError::EmptyAsset)
        ));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_header_overflow_sends_nothing() {
        let (pump, mut rx) = pump(4);
        let key = "k".repeat(80);

        let err = pump.send_image(&key, b"abcdefgh").await.unwrap_err();
        assert!(matches!(
            err,
            PumpError::Frame(FrameError::HeaderOverflow { .. })
        ));
        assert!(rx.try_recv().is_none());
        assert_eq!(pump.channel().stats().messages_sent, 0);
    }

    #[tokio::test]
    async fn test_overflow_on_last_index_detected_up_front() {
        // 17-byte key: indices 0..=9 fit in 64 bytes with totalChunks 11,
        // index 10 needs one more byte.
        let (pump, mut rx) = pump(1);
        let key = "k".repeat(17);
        assert!(encode_header(&ImageHeader::new(key.as_str(), 9, 11)).is_ok());

        let err = pump.send_image(&key, &[0u8; 11]).await.unwrap_err();
        assert!(matches!(
            err,
            PumpError::Frame(FrameError::HeaderOverflow { size: 65, max: 64 })
        ));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_asset() {
        let (channel, mut rx) = memory_channel_with_limit("image", 70);
        let pump = ChunkPump::new(Arc::new(channel), config(16)).unwrap();

        let err = pump.send_image("cam", &[1u8; 64]).await.unwrap_err();
        assert!(matches!(
            err,
            PumpError::Transport(TransportError::Rejected(_))
        ));
        assert!(rx.try_recv().is_none());
        assert_eq!(pump.channel().stats().send_errors, 1);
    }

    #[tokio::test]
    async fn test_backpressure_bounds_backlog() {
        let (channel, mut rx) = memory_channel("image");
        let channel = Arc::new(channel);
        let config = PumpConfig {
            image_high_water_mark: 1,
            ..config(8)
        };
        let pump = ChunkPump::new(Arc::clone(&channel), config).unwrap();
        let frame_len = crate::IMAGE_HEADER_SIZE + 8;

        let sender = tokio::spawn(async move { pump.send_image("cam", &[3u8; 80]).await });

        let mut received = 0;
        while received < 10 {
            // The pump only sends into an empty buffer.
            assert!(channel.buffered_amount().await <= frame_len);
            tokio::time::sleep(Duration::from_millis(5)).await;
            if let Some(frame) = rx.try_recv() {
                assert_eq!(frame.len(), frame_len);
                received += 1;
            }
        }

        assert_eq!(sender.await.unwrap().unwrap(), 10);
    }

    #[tokio::test]
    async fn test_close_while_stalled_fails() {
        let (channel, _rx) = memory_channel("image");
        let channel = Arc::new(channel);
        let config = PumpConfig {
            image_high_water_mark: 1,
            ..config(4)
        };
        let pump = ChunkPump::new(Arc::clone(&channel), config).unwrap();

        let sender = tokio::spawn(async move { pump.send_image("cam", &[0u8; 12]).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.close().await.unwrap();

        assert!(matches!(
            sender.await.unwrap(),
            Err(PumpError::Transport(TransportError::Closed))
        ));
        assert_eq!(channel.stats().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_recording_stream_frames() {
        let (channel, mut rx) = memory_channel("video");
        let pump = ChunkPump::new(Arc::new(channel), config(2)).unwrap();

        let mut stream = pump
            .begin_recording(RecordingInfo::new("rec-1", "cam", "video/webm"))
            .await
            .unwrap();
        assert_eq!(stream.push_blob(b"abc").await.unwrap(), 2);
        assert_eq!(stream.push_blob(b"").await.unwrap(), 0);
        assert_eq!(stream.push_blob(b"de").await.unwrap(), 1);
        assert_eq!(stream.blobs_sent(), 2);
        assert_eq!(stream.finish().await.unwrap(), 2);

        let frames = drain(&mut rx);
        let actions: Vec<VideoAction<'_>> = frames
            .iter()
            .map(|f| VideoAction::decode(f).unwrap())
            .collect();

        assert_eq!(actions.len(), 5);
        assert!(matches!(
            &actions[0],
            VideoAction::Start { mime_type, .. } if mime_type == "video/webm"
        ));
        assert_eq!(
            actions[1],
            VideoAction::Data {
                recording_id: "rec-1".into(),
                blob_index: 0,
                chunk_index: 0,
                total_chunks: 2,
                payload: b"ab",
            }
        );
        assert!(matches!(
            actions[2],
            VideoAction::Data { blob_index: 0, chunk_index: 1, payload: b"c", .. }
        ));
        assert!(matches!(
            actions[3],
            VideoAction::Data { blob_index: 1, chunk_index: 0, total_chunks: 1, .. }
        ));
        assert_eq!(
            actions[4],
            VideoAction::Stop {
                recording_id: "rec-1".into()
            }
        );
    }

    #[tokio::test]
    async fn test_start_overflow_sends_nothing() {
        let (channel, mut rx) = memory_channel("video");
        let pump = ChunkPump::new(Arc::new(channel), config(16)).unwrap();
        let info = RecordingInfo::new("r".repeat(300), "cam", "video/webm");

        assert!(matches!(
            pump.start_recording(&info).await,
            Err(PumpError::Frame(FrameError::HeaderOverflow { .. }))
        ));
        assert!(rx.try_recv().is_none());
    }
}
