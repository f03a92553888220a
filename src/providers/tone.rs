//! Sine tone generator source

use num_traits::FromPrimitive;
use std::f64::consts::TAU;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::source::{PacketSource, SourceEvent};
use crate::types::{ElementKind, PrecisionTime, Sample, StreamSri, units};
use crate::{Result, StreamError};

/// Generates a sine tone as a stream of fixed-size packets
///
/// The first event is the stream's SRI; each following event is one packet
/// whose time stamp advances by `packet_len * xdelta`. In complex mode each
/// sample is an I/Q pair `(cos, sin)`. A finite tone marks its last packet as
/// end-of-stream.
pub struct ToneSource<T> {
    sri: StreamSri,
    frequency: f64,
    amplitude: f64,
    packet_len: usize,
    /// Packets left to generate; `None` runs forever
    remaining: Option<usize>,
    phase: f64,
    time: PrecisionTime,
    sri_sent: bool,
    interval: Option<Interval>,
    _element: std::marker::PhantomData<T>,
}

impl<T: Sample + FromPrimitive> ToneSource<T> {
    /// Create a tone of `frequency` Hz sampled at `sample_rate` Hz
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Config`] if the sample rate is not positive, the
    /// packet length is zero, or the tone is above the Nyquist frequency.
    pub fn new(
        stream_id: impl Into<String>,
        frequency: f64,
        sample_rate: f64,
        packet_len: usize,
    ) -> Result<Self> {
        if sample_rate.is_nan() || sample_rate <= 0.0 {
            return Err(StreamError::config(format!("invalid sample rate {}", sample_rate)));
        }
        if packet_len == 0 {
            return Err(StreamError::config("packet length must be at least 1"));
        }
        if frequency.abs() > sample_rate / 2.0 {
            return Err(StreamError::config(format!(
                "tone of {} Hz exceeds Nyquist frequency of {} Hz",
                frequency,
                sample_rate / 2.0
            )));
        }

        let mut sri = StreamSri::new(stream_id).with_xdelta(1.0 / sample_rate);
        sri.xunits = units::TIME;
        info!(stream_id = %sri.stream_id, frequency, sample_rate, "Tone source created");

        Ok(Self {
            sri,
            frequency,
            amplitude: 1.0,
            packet_len,
            remaining: None,
            phase: 0.0,
            time: PrecisionTime::now(),
            sri_sent: false,
            interval: None,
            _element: std::marker::PhantomData,
        })
    }

    /// Peak value of the generated samples
    pub fn with_amplitude(mut self, amplitude: f64) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Generate I/Q pairs instead of a real tone
    pub fn with_complex(mut self, complex: bool) -> Self {
        self.sri = self.sri.with_complex(complex);
        self
    }

    /// Stop after `packets` packets, marking the last one end-of-stream
    pub fn with_packet_count(mut self, packets: usize) -> Self {
        self.remaining = Some(packets);
        self
    }

    /// Time stamp of the first sample
    pub fn with_start_time(mut self, time: PrecisionTime) -> Self {
        self.time = time;
        self
    }

    /// Pace packets at the rate they would arrive from real hardware
    ///
    /// Must be called within a tokio runtime.
    pub fn realtime(mut self) -> Self {
        let period = Duration::from_secs_f64(self.packet_len as f64 * self.sri.xdelta);
        let mut pacing = interval(period);
        pacing.set_missed_tick_behavior(MissedTickBehavior::Burst);
        self.interval = Some(pacing);
        debug!("Tone pacing set to {:?} per packet", period);
        self
    }

    /// The SRI describing the generated stream
    pub fn sri(&self) -> &StreamSri {
        &self.sri
    }

    fn generate(&mut self) -> Result<Vec<T>> {
        let step = TAU * self.frequency * self.sri.xdelta;
        let complex = self.sri.is_complex();
        let mut data = Vec::with_capacity(if complex { self.packet_len * 2 } else { self.packet_len });

        for _ in 0..self.packet_len {
            if complex {
                data.push(self.convert(self.phase.cos())?);
                data.push(self.convert(self.phase.sin())?);
            } else {
                data.push(self.convert(self.phase.sin())?);
            }
            self.phase = (self.phase + step) % TAU;
        }
        Ok(data)
    }

    fn convert(&self, value: f64) -> Result<T> {
        let scaled = match T::KIND {
            ElementKind::Float32 | ElementKind::Float64 => value * self.amplitude,
            _ => (value * self.amplitude).round(),
        };
        T::from_f64(scaled).ok_or_else(|| {
            StreamError::config(format!(
                "amplitude {} does not fit the element type",
                self.amplitude
            ))
        })
    }
}

#[async_trait::async_trait]
impl<T: Sample + FromPrimitive> PacketSource<T> for ToneSource<T> {
    async fn next_event(&mut self) -> Result<Option<SourceEvent<T>>> {
        if !self.sri_sent {
            self.sri_sent = true;
            return Ok(Some(SourceEvent::Sri(self.sri.clone())));
        }
        if self.remaining == Some(0) {
            return Ok(None);
        }

        if let Some(pacing) = self.interval.as_mut() {
            pacing.tick().await;
        }

        let data = self.generate()?;
        let time = self.time;
        self.time += self.packet_len as f64 * self.sri.xdelta;

        let eos = match self.remaining.as_mut() {
            Some(left) => {
                *left -= 1;
                *left == 0
            }
            None => false,
        };

        Ok(Some(SourceEvent::Data {
            stream_id: self.sri.stream_id.clone(),
            data: data.into(),
            time,
            eos,
        }))
    }
}
