//! Audio sinks.
//!
//! The core pushes interleaved stereo i16 PCM through the audio callbacks; the host
//! applies the user gain and hands the result to whichever sink the session was
//! built with:
//! - `NullSink`: discards everything (still tracks open/volume state)
//! - `CaptureSink`: keeps post-gain samples in memory (WAV dumps, tests)
//! - `CpalSink` (feature `cpal`): live output through the default device
//!
//! Writes that arrive before `init` (or after `stop`) are dropped.

use std::sync::{Arc, Mutex};

use log::debug;

use super::utils::apply_gain;

/// Destination for the core's PCM stream.
pub trait AudioSink {
    /// Open (or reopen) the output stream at `sample_rate` Hz, stereo.
    fn init(&mut self, sample_rate: u32);

    /// Push interleaved stereo samples. Dropped while the stream is closed.
    fn write(&mut self, samples: &[i16]);

    /// Set linear gain. Values are clamped to `[0, 1]`; NaN is treated as 0.
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    /// Halt and release the stream. Safe to call when already closed.
    fn stop(&mut self);

    fn is_open(&self) -> bool;
}

pub(crate) fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Sink that accepts and discards samples.
#[derive(Debug)]
pub struct NullSink {
    open: bool,
    volume: f32,
}

impl Default for NullSink {
    fn default() -> Self {
        Self {
            open: false,
            volume: 1.0,
        }
    }
}

impl AudioSink for NullSink {
    fn init(&mut self, _sample_rate: u32) {
        self.open = true;
    }

    fn write(&mut self, _samples: &[i16]) {}

    fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn stop(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Samples captured so far, shared with whoever created the sink.
#[derive(Debug, Default)]
pub struct Capture {
    pub sample_rate: u32,
    /// Interleaved stereo, post-gain.
    pub samples: Vec<i16>,
}

/// Sink that records post-gain samples in memory.
///
/// The buffer is shared so it can still be read after the sink has been boxed
/// into a session.
#[derive(Debug)]
pub struct CaptureSink {
    capture: Arc<Mutex<Capture>>,
    open: bool,
    volume: f32,
    scratch: Vec<i16>,
}

impl Default for CaptureSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            capture: Arc::new(Mutex::new(Capture::default())),
            open: false,
            volume: 1.0,
            scratch: Vec::new(),
        }
    }

    /// Handle to the captured samples.
    pub fn capture(&self) -> Arc<Mutex<Capture>> {
        Arc::clone(&self.capture)
    }
}

impl AudioSink for CaptureSink {
    fn init(&mut self, sample_rate: u32) {
        if let Ok(mut c) = self.capture.lock() {
            c.sample_rate = sample_rate;
        }
        self.open = true;
        debug!("capture sink opened at {sample_rate} Hz");
    }

    fn write(&mut self, samples: &[i16]) {
        if !self.open {
            return;
        }
        apply_gain(samples, self.volume, &mut self.scratch);
        if let Ok(mut c) = self.capture.lock() {
            c.samples.extend_from_slice(&self.scratch);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = clamp_volume(volume);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn stop(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(feature = "cpal")]
pub use self::device::CpalSink;

#[cfg(feature = "cpal")]
mod device {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Stream, StreamConfig};
    use log::{error, info, warn};
    use ringbuf::HeapRb;
    use ringbuf::traits::{Consumer, Observer, Producer, Split};

    use super::{AudioSink, apply_gain, clamp_volume};

    /// Ring buffer capacity in samples (about a quarter second at 48 kHz stereo).
    const RING_BUFFER_SAMPLES: usize = 48_000 / 2;

    struct Output {
        // Must be kept alive for the device callback to keep running.
        _stream: Stream,
        producer: ringbuf::HeapProd<i16>,
    }

    /// Live output through the default cpal device.
    ///
    /// The device callback drains a lock-free ring buffer and fills any shortfall
    /// with silence.
    pub struct CpalSink {
        output: Option<Output>,
        volume: f32,
        scratch: Vec<i16>,
    }

    impl Default for CpalSink {
        fn default() -> Self {
            Self::new()
        }
    }

    impl CpalSink {
        pub fn new() -> Self {
            Self {
                output: None,
                volume: 1.0,
                scratch: Vec::new(),
            }
        }

        fn open(sample_rate: u32) -> Result<Output, String> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| "no audio output device found".to_string())?;

            let config = StreamConfig {
                channels: 2,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let ring = HeapRb::<i16>::new(RING_BUFFER_SAMPLES);
            let (producer, mut consumer) = ring.split();

            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        let read = consumer.pop_slice(data);
                        data[read..].fill(0);
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
                .map_err(|e| e.to_string())?;
            stream.play().map_err(|e| e.to_string())?;

            info!("audio output initialized: {sample_rate} Hz, {RING_BUFFER_SAMPLES} sample ring buffer");
            Ok(Output {
                _stream: stream,
                producer,
            })
        }
    }

    impl AudioSink for CpalSink {
        fn init(&mut self, sample_rate: u32) {
            self.output = None;
            match Self::open(sample_rate) {
                Ok(output) => self.output = Some(output),
                Err(e) => warn!("audio output unavailable: {e}"),
            }
        }

        fn write(&mut self, samples: &[i16]) {
            let Some(output) = self.output.as_mut() else {
                return;
            };
            apply_gain(samples, self.volume, &mut self.scratch);
            let written = output.producer.push_slice(&self.scratch);
            if written < self.scratch.len() {
                log::trace!(
                    "audio ring full, dropped {} samples (vacant {})",
                    self.scratch.len() - written,
                    output.producer.vacant_len()
                );
            }
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = clamp_volume(volume);
        }

        fn volume(&self) -> f32 {
            self.volume
        }

        fn stop(&mut self) {
            self.output = None;
        }

        fn is_open(&self) -> bool {
            self.output.is_some()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_before_init_are_dropped() {
        let mut sink = CaptureSink::new();
        let capture = sink.capture();
        sink.write(&[100, -100]);
        assert!(capture.lock().unwrap().samples.is_empty());

        sink.init(44_100);
        sink.write(&[100, -100]);
        assert_eq!(capture.lock().unwrap().samples, vec![100, -100]);
        assert_eq!(capture.lock().unwrap().sample_rate, 44_100);
    }

    #[test]
    fn half_volume_rounds_each_sample() {
        let mut sink = CaptureSink::new();
        let capture = sink.capture();
        sink.init(48_000);
        sink.set_volume(0.5);
        sink.write(&[1000, -1000, 3, i16::MIN]);
        assert_eq!(capture.lock().unwrap().samples, vec![500, -500, 2, -16384]);
    }

    #[test]
    fn zero_volume_writes_silence_of_same_length() {
        let mut sink = CaptureSink::new();
        let capture = sink.capture();
        sink.init(48_000);
        sink.set_volume(0.0);
        sink.write(&[1, 2, 3, 4]);
        assert_eq!(capture.lock().unwrap().samples, vec![0, 0, 0, 0]);
    }

    #[test]
    fn volume_is_clamped() {
        let mut sink = NullSink::default();
        sink.set_volume(2.5);
        assert_eq!(sink.volume(), 1.0);
        sink.set_volume(-1.0);
        assert_eq!(sink.volume(), 0.0);
        sink.set_volume(f32::NAN);
        assert_eq!(sink.volume(), 0.0);
    }

    #[test]
    fn stop_is_safe_when_closed() {
        let mut sink = CaptureSink::new();
        sink.stop();
        assert!(!sink.is_open());
        sink.init(32_000);
        sink.stop();
        sink.stop();
        assert!(!sink.is_open());
    }
}
