//! Audio output plumbing.
//!
//! The render loop fills a bounded queue of packed stereo frames and the
//! device callback drains it, one frame per output sample. An underrun
//! plays silence; nothing in the callback blocks or allocates.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::queue::ArrayQueue;
use failure::{err_msg, Error};

use fixwave_core::{fp, Stereo};

use std::sync::Arc;

/// Frame queue depth; about 23 ms of audio at 44.1 kHz.
pub const FRAME_QUEUE_SIZE: usize = 1024;

pub struct AudioOutput {
    /// Keeps the device stream alive for as long as the output is held.
    _stream: cpal::Stream,
    pub sample_rate: u32,
    pub frames: Arc<ArrayQueue<u32>>,
}

/// Opens the default output device and starts a stream pulling frames
/// from the returned queue.
pub fn start() -> Result<AudioOutput, Error> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| err_msg("no audio output device available"))?;
    let config = device
        .default_output_config()
        .map_err(|e| err_msg(e.to_string()))?;

    let sample_rate = config.sample_rate().0;
    let channels = usize::from(config.channels());
    let frames: Arc<ArrayQueue<u32>> = Arc::new(ArrayQueue::new(FRAME_QUEUE_SIZE));

    log::info!(
        "audio output: {} Hz, {} channels, {:?}",
        sample_rate,
        channels,
        config.sample_format()
    );

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(&device, &config.into(), channels, Arc::clone(&frames))?
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(&device, &config.into(), channels, Arc::clone(&frames))?
        }
        fmt => return Err(err_msg(format!("unsupported sample format {:?}", fmt))),
    };
    stream.play().map_err(|e| err_msg(e.to_string()))?;

    Ok(AudioOutput {
        _stream: stream,
        sample_rate,
        frames,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    frames: Arc<ArrayQueue<u32>>,
) -> Result<cpal::Stream, Error>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for chunk in data.chunks_mut(channels) {
                    let frame = frames
                        .pop()
                        .map(Stereo::from_word)
                        .unwrap_or(Stereo::SILENCE);
                    chunk[0] = T::from_sample(fp::to_f32(frame.left));
                    if channels > 1 {
                        chunk[1] = T::from_sample(fp::to_f32(frame.right));
                    }
                    for extra in chunk.iter_mut().skip(2) {
                        *extra = T::from_sample(0.0);
                    }
                }
            },
            |err| log::error!("audio stream error: {}", err),
            None,
        )
        .map_err(|e| err_msg(e.to_string()))
}
