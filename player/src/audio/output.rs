//! cpal stream and ring buffer producer

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use cellsynth_core::{AudioSink, SinkError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::{error, info, warn};

use super::{RING_SECONDS, f32_to_i16, f32_to_u16, fan_out, queued_duration};

/// Sleep while the ring buffer is full.
const FULL_WAIT: Duration = Duration::from_millis(1);

/// A write that makes no progress for this long means the stream stopped pulling.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Last error reported by the cpal error callback.
type ErrorSlot = Arc<Mutex<Option<String>>>;

fn take_error(slot: &ErrorSlot) -> Option<String> {
    slot.lock()
        .unwrap_or_else(|e| {
            warn!("Audio error slot was poisoned, recovering");
            e.into_inner()
        })
        .take()
}

/// Open cpal output stream.
///
/// Must be kept alive, on the thread that created it, for as long as audio
/// should play.
pub struct CpalOutput {
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: usize,
    device_name: String,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate` and start playback.
    ///
    /// The device must support the rate natively; samples are never resampled.
    pub fn open(sample_rate: u32) -> Result<(Self, CpalWriter), SinkError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(SinkError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let ranges: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| SinkError::Stream(e.to_string()))?
            .filter(|range| {
                range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0
            })
            .filter(|range| {
                matches!(
                    range.sample_format(),
                    cpal::SampleFormat::F32 | cpal::SampleFormat::I16 | cpal::SampleFormat::U16
                )
            })
            .collect();

        // Prefer f32, then fewest channels
        let range = ranges
            .into_iter()
            .min_by_key(|range| (range.sample_format() != cpal::SampleFormat::F32, range.channels()))
            .ok_or_else(|| SinkError::UnsupportedFormat(format!("{sample_rate} Hz output")))?;
        let supported = range.with_sample_rate(cpal::SampleRate(sample_rate));

        let channels = supported.channels() as usize;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.config();

        let ring = HeapRb::<f32>::new(sample_rate as usize * channels * RING_SECONDS);
        let (producer, consumer) = ring.split();
        let errors: ErrorSlot = Arc::new(Mutex::new(None));

        let stream = match format {
            cpal::SampleFormat::F32 => {
                build_stream(&device, &config, consumer, errors.clone(), |s| s, 0.0f32)?
            }
            cpal::SampleFormat::I16 => {
                build_stream(&device, &config, consumer, errors.clone(), f32_to_i16, 0i16)?
            }
            cpal::SampleFormat::U16 => {
                build_stream(&device, &config, consumer, errors.clone(), f32_to_u16, 32768u16)?
            }
            other => return Err(SinkError::UnsupportedFormat(format!("{other:?} samples"))),
        };

        stream
            .play()
            .map_err(|e| SinkError::Stream(e.to_string()))?;

        info!(
            "Audio output: {} at {} Hz, {} channel(s), {:?}",
            device_name, sample_rate, channels, format
        );

        let writer = CpalWriter {
            producer,
            channels,
            sample_rate,
            errors,
            interleaved: Vec::new(),
        };
        Ok((
            Self {
                _stream: stream,
                sample_rate,
                channels,
                device_name,
            },
            writer,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<f32>,
    errors: ErrorSlot,
    convert: fn(f32) -> T,
    silence: T,
) -> Result<cpal::Stream, SinkError>
where
    T: cpal::SizedSample + Send + 'static,
{
    let mut temp_buffer: Vec<f32> = vec![0.0; 4096];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if temp_buffer.len() < data.len() {
                    temp_buffer.resize(data.len(), 0.0);
                }
                let popped = consumer.pop_slice(&mut temp_buffer[..data.len()]);
                for (out, &sample) in data.iter_mut().zip(&temp_buffer[..popped]) {
                    *out = convert(sample);
                }
                data[popped..].fill(silence);
            },
            move |err| {
                error!("Audio stream error: {}", err);
                let mut slot = errors.lock().unwrap_or_else(|e| e.into_inner());
                *slot = Some(err.to_string());
            },
            None,
        )
        .map_err(|e| SinkError::Stream(e.to_string()))
}

/// Producer half of the output ring buffer.
pub struct CpalWriter {
    producer: HeapProd<f32>,
    channels: usize,
    sample_rate: u32,
    errors: ErrorSlot,
    interleaved: Vec<f32>,
}

impl AudioSink for CpalWriter {
    /// Blocks while the ring buffer is full.
    fn write(&mut self, samples: &[f32]) -> Result<(), SinkError> {
        if let Some(message) = take_error(&self.errors) {
            return Err(SinkError::Device(message));
        }

        fan_out(samples, self.channels, &mut self.interleaved);

        let mut offset = 0;
        let mut last_progress = Instant::now();
        while offset < self.interleaved.len() {
            let pushed = self.producer.push_slice(&self.interleaved[offset..]);
            if pushed > 0 {
                offset += pushed;
                last_progress = Instant::now();
                continue;
            }

            if let Some(message) = take_error(&self.errors) {
                return Err(SinkError::Device(message));
            }
            if last_progress.elapsed() >= STALL_TIMEOUT {
                return Err(SinkError::Device(format!(
                    "output stalled for {:?}",
                    STALL_TIMEOUT
                )));
            }
            thread::sleep(FULL_WAIT);
        }
        Ok(())
    }

    fn latency(&self) -> Duration {
        queued_duration(self.producer.occupied_len(), self.channels, self.sample_rate)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
