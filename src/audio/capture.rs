//! Microphone capture using cpal.
//!
//! The capture stream is an exclusively-owned resource: acquired when
//! listening starts, fully released when it stops. Because a cpal stream is
//! not `Send`, the stream lives on a dedicated thread for its whole lifetime;
//! that thread also drains the lock-free ring buffer fed by the real-time
//! callback and hands batches to the sample sink.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::resampler::ResamplerState;
use super::util::{find_best_config, get_device_name, mix_to_mono};

/// Ring buffer size in samples (~4 seconds at 16kHz).
const RING_SIZE: usize = 65536;

/// Errors surfaced when acquiring the capture stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("no audio capture device available")]
    DeviceUnavailable,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Consumer of captured mono samples at the target rate.
pub type SampleSink = Arc<dyn Fn(&[f32]) + Send + Sync>;

/// Source of capture streams. The controller acquires at most one stream at a
/// time through this seam; tests substitute a mock.
pub trait CaptureProvider: Send {
    fn open(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Live, exclusively-owned capture stream.
pub trait CaptureStream: Send {
    /// Stop the stream and release the device.
    fn stop(&mut self);
}

/// cpal-backed capture provider bound to one sink and target sample rate.
pub struct CpalCapture {
    sample_rate: u32,
    sink: SampleSink,
}

impl CpalCapture {
    pub fn new(sample_rate: u32, sink: SampleSink) -> Self {
        Self { sample_rate, sink }
    }
}

impl CaptureProvider for CpalCapture {
    fn open(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let stream = MicStream::open(self.sample_rate, self.sink.clone())?;
        Ok(Box::new(stream))
    }
}

/// Handle to the thread owning the cpal stream.
pub struct MicStream {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MicStream {
    fn open(sample_rate: u32, sink: SampleSink) -> Result<Self, CaptureError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        // The stream must be built, used, and dropped on the same thread.
        // Acquisition success or failure is reported back over this channel.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();

        let handle = std::thread::spawn(move || {
            let stream = match build_stream(sample_rate) {
                Ok(parts) => parts,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let (stream, mut consumer) = stream;

            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(classify_message(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Drain loop: pull captured samples off the ring buffer and hand
            // them to the sink, off the real-time callback thread.
            let mut read_buffer = vec![0.0f32; 2048];
            loop {
                if thread_shutdown.load(Ordering::Relaxed) {
                    debug!("Capture thread shutting down");
                    break;
                }

                let available = consumer.occupied_len();
                if available == 0 {
                    // 100us keeps latency low without busy-waiting
                    std::thread::sleep(std::time::Duration::from_micros(100));
                    continue;
                }

                let to_read = available.min(read_buffer.len());
                let read = consumer.pop_slice(&mut read_buffer[..to_read]);
                if read > 0 {
                    sink(&read_buffer[..read]);
                }
            }

            drop(stream);
            info!("Audio capture stopped");
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { shutdown, handle: Some(handle) }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CaptureError::Backend(anyhow::anyhow!("capture thread exited before reporting readiness")))
            }
        }
    }
}

impl CaptureStream for MicStream {
    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.join()
        {
            warn!("Failed to join capture thread: {:?}", e);
        }
    }
}

impl Drop for MicStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build the cpal input stream feeding a lock-free ring buffer.
///
/// Returns the live stream together with the ring buffer consumer. Resampling
/// to the target rate is applied inside the callback when the device rate
/// differs.
fn build_stream(sample_rate: u32) -> Result<(cpal::Stream, ringbuf::HeapCons<f32>), CaptureError> {
    let host = cpal::default_host();
    let device = host.default_input_device().ok_or(CaptureError::DeviceUnavailable)?;

    info!("Using input device: {}", get_device_name(&device));

    let supported_configs = device.supported_input_configs().map_err(|e| match e {
        cpal::SupportedStreamConfigsError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        other => classify_message(other.to_string()),
    })?;

    let config = find_best_config(supported_configs, sample_rate)?;
    let device_sample_rate = config.sample_rate();
    let channels = config.channels() as usize;

    let needs_resampling = device_sample_rate != sample_rate;
    if needs_resampling {
        info!("Device sample rate {} Hz differs from target {} Hz - resampling will be applied", device_sample_rate, sample_rate);
    }

    debug!("Audio capture config: {} Hz, {} channels, {:?}", device_sample_rate, channels, config.sample_format());

    let stream_config: StreamConfig = config.config();

    let ring = HeapRb::<f32>::new(RING_SIZE);
    let (mut producer, consumer) = ring.split();

    let resampler_state = if needs_resampling { Some(ResamplerState::new(device_sample_rate, sample_rate)?) } else { None };

    let err_fn = |err| {
        tracing::error!("Audio capture error: {}", err);
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let samples = mix_to_mono(data, channels);

                let final_samples = match &resampler_state {
                    Some(state) => state.lock().process_samples(&samples),
                    None => Some(samples),
                };

                // Push to ring buffer (lock-free, non-blocking)
                if let Some(samples) = final_samples {
                    let written = producer.push_slice(&samples);
                    if written < samples.len() {
                        static DROP_COUNT: AtomicU64 = AtomicU64::new(0);
                        let count = DROP_COUNT.fetch_add(1, Ordering::Relaxed);
                        if count.is_multiple_of(100) {
                            warn!("Ring buffer full, dropped {} audio chunks", count + 1);
                        }
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
            other => classify_message(other.to_string()),
        })?;

    info!("Audio capture configured: device {} Hz -> output {} Hz", device_sample_rate, sample_rate);

    Ok((stream, consumer))
}

/// Sort backend-specific failures into the capture error taxonomy.
///
/// cpal reports OS permission refusals as backend-specific errors, so the
/// message text is the only signal available.
fn classify_message(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        CaptureError::PermissionDenied
    } else {
        CaptureError::Backend(anyhow::anyhow!(message))
    }
}
