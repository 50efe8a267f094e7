//! Fuzz target for frame parsing
//!
//! Feeds arbitrary bytes to both frame decoders and, when a frame decodes,
//! through the receive-side managers. Nothing may panic.

#![no_main]

use std::sync::Arc;

use blobwire_core::{ChannelAdapter, ChannelKind, ChannelSink, Frame, ImageHeader, VideoAction};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = Frame::<ImageHeader>::parse(data);
    let _ = VideoAction::decode(data);

    let (sink, _assets) = ChannelSink::new();
    let adapter = ChannelAdapter::new(Arc::new(sink));
    adapter.on_message(ChannelKind::Image, data);
    adapter.on_message(ChannelKind::Video, data);
    adapter.on_channel_closed(ChannelKind::Video);
});
