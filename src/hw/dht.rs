//! Bit-banged DHT11 single-wire protocol.

use crate::sensors::dht11::{DhtBus, FrameError, bits_to_bytes, decode_frame};
use esp_idf_svc::hal::delay::{Ets, FreeRtos};
use esp_idf_svc::hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};
use esp_idf_svc::hal::interrupt;
use esp_idf_svc::sys::{EspError, esp_timer_get_time};
use log::debug;
use std::time::{Duration, Instant};

/// The DHT11 cannot be sampled faster than this; repeated calls reuse the
/// previous frame.
const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(2000);
const EDGE_TIMEOUT_US: i64 = 1000;

pub struct DhtPin<'d> {
    pin: PinDriver<'d, AnyIOPin, InputOutput>,
    last_frame: Option<(Instant, Result<(f32, f32), FrameError>)>,
}

impl<'d> DhtPin<'d> {
    pub fn new(pin: AnyIOPin) -> Result<Self, EspError> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        Ok(Self {
            pin,
            last_frame: None,
        })
    }

    /// Microseconds the line stayed at `high` before flipping.
    fn wait_while(&self, high: bool) -> Result<u32, FrameError> {
        let start = unsafe { esp_timer_get_time() };
        loop {
            let elapsed = unsafe { esp_timer_get_time() } - start;
            if self.pin.is_high() != high {
                return Ok(u32::try_from(elapsed).unwrap_or(u32::MAX));
            }
            if elapsed > EDGE_TIMEOUT_US {
                return Err(FrameError::Timeout);
            }
        }
    }

    fn read_frame(&mut self) -> Result<(f32, f32), FrameError> {
        // Start signal: hold the line low for at least 18ms, then release it.
        self.pin.set_low().map_err(|_| FrameError::Timeout)?;
        FreeRtos::delay_ms(20);
        self.pin.set_high().map_err(|_| FrameError::Timeout)?;
        Ets::delay_us(40);

        let mut pulses = [0u32; 40];
        interrupt::free(|| {
            // Sensor response: 80us low, 80us high.
            self.wait_while(false)?;
            self.wait_while(true)?;
            for pulse in pulses.iter_mut() {
                self.wait_while(false)?;
                *pulse = self.wait_while(true)?;
            }
            Ok::<(), FrameError>(())
        })?;

        decode_frame(bits_to_bytes(&pulses))
    }

    fn sample(&mut self) -> Option<(f32, f32)> {
        let fresh = matches!(self.last_frame, Some((at, _)) if at.elapsed() < MIN_FRAME_INTERVAL);
        if !fresh {
            let frame = self.read_frame();
            if let Err(e) = &frame {
                debug!("DHT11 frame error: {:?}", e);
            }
            self.last_frame = Some((Instant::now(), frame));
        }
        self.last_frame.and_then(|(_, frame)| frame.ok())
    }
}

impl DhtBus for DhtPin<'_> {
    type Error = EspError;

    fn begin(&mut self) -> Result<(), EspError> {
        self.pin.set_high()?;
        self.last_frame = None;
        Ok(())
    }

    fn read_humidity(&mut self) -> f32 {
        self.sample().map_or(f32::NAN, |(humidity, _)| humidity)
    }

    fn read_temperature(&mut self) -> f32 {
        self.sample().map_or(f32::NAN, |(_, temperature)| temperature)
    }
}
