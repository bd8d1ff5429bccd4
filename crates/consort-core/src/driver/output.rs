//! CPAL output driver: the rack's stereo output goes to a system device.

use super::AudioDriver;
use crate::engine::Engine;
use crate::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Weak;

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The driver is only
/// reached through the engine's driver mutex, so the stream is never used
/// from two threads at once.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: see `StreamHandle`; access is serialized by the engine's mutex.
unsafe impl Send for StreamHandle {}

pub struct CpalDriver {
    device_index: Option<usize>,
    sample_rate: f64,
    channels: usize,
    buffer_size: usize,
    stream: Option<StreamHandle>,
}

impl std::fmt::Debug for CpalDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalDriver")
            .field("device_index", &self.device_index)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("running", &self.stream.is_some())
            .finish()
    }
}

impl CpalDriver {
    /// Open the default output device, or the one at `device_index`.
    /// `buffer_size` is the most frames the engine is prepared for.
    pub fn new(device_index: Option<usize>, buffer_size: usize) -> Result<Self> {
        let device = get_device(device_index)?;
        let config = device.default_output_config().map_err(driver_error)?;
        Ok(Self {
            device_index,
            sample_rate: config.sample_rate().0 as f64,
            channels: config.channels() as usize,
            buffer_size: buffer_size.max(1),
            stream: None,
        })
    }

    pub fn list_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()
            .map_err(driver_error)?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name().map_err(driver_error)?)))
            .collect()
    }
}

impl AudioDriver for CpalDriver {
    fn name(&self) -> &str {
        "CPAL"
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn start(&mut self, engine: Weak<Engine>) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let device = get_device(self.device_index)?;
        let config = device.default_output_config().map_err(driver_error)?;
        let frames = self.buffer_size;

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config.into(), engine, frames)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config.into(), engine, frames)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config.into(), engine, frames)?,
            format => {
                return Err(Error::Driver(format!("Unsupported sample format: {format:?}")));
            }
        };
        stream.play().map_err(driver_error)?;
        self.stream = Some(StreamHandle(stream));
        Ok(())
    }

    fn stop(&mut self) {
        self.stream = None;
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }
}

fn driver_error(e: impl std::fmt::Display) -> Error {
    Error::Driver(e.to_string())
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match index {
        Some(i) => {
            let devices: Vec<_> = host.output_devices().map_err(driver_error)?.collect();
            let count = devices.len();
            devices.into_iter().nth(i).ok_or_else(|| {
                Error::Driver(format!("Device index {i} out of range ({count} available)"))
            })
        }
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Driver("No output device available".into())),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    engine: Weak<Engine>,
    max_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let sample_rate = config.sample_rate.0 as f64;
    let shutdown = engine.clone();

    // Pre-allocated; a device block larger than this is processed in pieces.
    let silence = vec![0.0f32; max_frames];
    let mut left = vec![0.0f32; max_frames];
    let mut right = vec![0.0f32; max_frames];

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let Some(engine) = engine.upgrade() else {
                    output_silence(data);
                    return;
                };
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let total = data.len() / channels;
                    let mut done = 0;
                    while done < total {
                        let frames = (total - done).min(max_frames);
                        engine.process(
                            &[&silence[..frames], &silence[..frames]],
                            &mut [&mut left[..frames], &mut right[..frames]],
                            &[],
                            frames,
                        );
                        let out = &mut data[done * channels..(done + frames) * channels];
                        write_output(out, channels, &left[..frames], &right[..frames]);
                        done += frames;
                    }
                    engine.transport().advance(total as u64, sample_rate);
                }));
                if result.is_err() {
                    output_silence(data);
                }
            },
            move |err| {
                if let cpal::StreamError::DeviceNotAvailable = err {
                    if let Some(engine) = shutdown.upgrade() {
                        engine.handle_driver_shutdown();
                    }
                }
            },
            None,
        )
        .map_err(driver_error)?;
    Ok(stream)
}

/// Interleave the stereo rack output; extra device channels stay silent.
#[inline]
fn write_output<T: cpal::SizedSample + cpal::FromSample<f32>>(
    data: &mut [T],
    channels: usize,
    left: &[f32],
    right: &[f32],
) {
    for (i, sample) in data.iter_mut().enumerate() {
        let frame = i / channels;
        let value = match i % channels {
            0 => left[frame],
            1 => right[frame],
            _ => 0.0,
        };
        *sample = T::from_sample(value);
    }
}

/// Output silence (panic recovery).
#[inline]
fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}
