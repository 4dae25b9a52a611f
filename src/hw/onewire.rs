//! Dallas thermometers over the `one-wire-bus` and `ds18b20` drivers.

use crate::sensors::ds18b20::{DEVICE_DISCONNECTED_C, DallasBus};
use ds18b20::Ds18b20;
use esp_idf_svc::hal::delay::Ets;
use esp_idf_svc::hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};
use esp_idf_svc::sys::EspError;
use log::debug;
use one_wire_bus::{Address, OneWire, OneWireError};

const READ_POWER_SUPPLY: u8 = 0xB4;

type Pin<'d> = PinDriver<'d, AnyIOPin, InputOutput>;

pub struct OneWireBus<'d> {
    bus: OneWire<Pin<'d>>,
    devices: Vec<Address>,
    delay: Ets,
}

impl<'d> OneWireBus<'d> {
    pub fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        let bus = OneWire::new(pin).map_err(|e| anyhow::anyhow!("OneWire setup failed: {:?}", e))?;
        Ok(Self {
            bus,
            devices: Vec::new(),
            delay: Ets,
        })
    }
}

impl DallasBus for OneWireBus<'_> {
    type Error = OneWireError<EspError>;

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.devices.clear();
        for device in self.bus.devices(false, &mut self.delay) {
            let address = device?;
            if address.family_code() == ds18b20::FAMILY_CODE {
                debug!("OneWire device {:?}", address);
                self.devices.push(address);
            }
        }
        Ok(())
    }

    fn device_count(&self) -> u8 {
        u8::try_from(self.devices.len()).unwrap_or(u8::MAX)
    }

    fn is_parasite_power(&mut self) -> bool {
        // Parasite-powered devices pull the line low in the read slot.
        self.bus
            .send_command(READ_POWER_SUPPLY, None, &mut self.delay)
            .and_then(|()| self.bus.read_bit(&mut self.delay))
            .map(|powered| !powered)
            .unwrap_or(false)
    }

    fn request_temperatures(&mut self) -> Result<(), Self::Error> {
        ds18b20::start_simultaneous_temp_measurement(&mut self.bus, &mut self.delay)
    }

    fn temperature_c(&mut self, index: u8) -> Result<f32, Self::Error> {
        let Some(address) = self.devices.get(usize::from(index)) else {
            return Ok(DEVICE_DISCONNECTED_C);
        };
        let sensor = Ds18b20::new::<EspError>(*address)?;
        let data = sensor.read_data(&mut self.bus, &mut self.delay)?;
        Ok(data.temperature)
    }
}
