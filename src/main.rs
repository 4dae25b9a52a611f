#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::main()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("sensor-uplink only runs on ESP32 targets (target_os = \"espidf\")");
}

#[cfg(target_os = "espidf")]
mod firmware {
    use anyhow::Context;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::gpio::AnyIOPin;
    use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::hal::units::Hertz;
    use esp_idf_svc::log::EspLogger;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys::link_patches;
    use log::error;
    use sensor_uplink::config::Config;
    use sensor_uplink::hw::{DhtPin, OneWireBus, Scd4xI2c, SharedI2cBus};
    use sensor_uplink::logging::{SystemInfo, log_sensor_error, log_system_info, print_splash_screen};
    use sensor_uplink::network::{StationLink, WifiManager};
    use sensor_uplink::power::{
        BootCounter, DeepSleep, EspDeepSleep, RtcBootCounter, free_heap_bytes, wakeup_cause,
    };
    use sensor_uplink::publisher::supabase::EspHttpTransport;
    use sensor_uplink::publisher::SupabasePublisher;
    use sensor_uplink::sensors::{self, Dht11Sensor, Ds18b20Sensor, Scd41Sensor, dht11, scd41};
    use sensor_uplink::time_utils::{EspClock, set_timezone};
    use sensor_uplink::{Node, PublishPlan};
    use std::cell::RefCell;

    pub fn main() -> anyhow::Result<()> {
        link_patches();
        EspLogger::initialize_default();

        print_splash_screen();

        let config = Config::from_env();
        set_timezone(&config.timezone);

        log_system_info(&SystemInfo {
            boot_count: RtcBootCounter.increment(),
            free_heap_bytes: free_heap_bytes(),
            sleep_duration_s: config.sleep_duration_s,
            wakeup_cause: wakeup_cause(),
        });

        // Only returns if bring-up failed before the cycle could start.
        if let Err(e) = run(config.clone()) {
            error!("‼️ Bring-up failed: {:#}", e);
        }

        let mut sleeper = EspDeepSleep;
        if let Err(e) = sleeper.arm_timer(config.sleep_duration_s) {
            error!("‼️ {:#}. Restarting.", e);
            sleeper.restart();
        }
        sleeper.enter()
    }

    fn gpio(pin: u8) -> AnyIOPin {
        // Pin numbers come from the board configuration and are not used elsewhere.
        unsafe { AnyIOPin::new(i32::from(pin)) }
    }

    fn run(config: Config) -> anyhow::Result<()> {
        let peripherals = Peripherals::take().context("‼️ Failed to take Peripherals")?;
        let sys_loop = EspSystemEventLoop::take().context("‼️ Failed to take system event loop")?;
        let nvs = EspDefaultNvsPartition::take().context("‼️ Failed to take NVS partition")?;

        let i2c_config = I2cConfig::new().baudrate(Hertz(config.i2c_frequency_hz));
        let i2c_driver = I2cDriver::new(
            peripherals.i2c0,
            gpio(config.i2c_sda_pin),
            gpio(config.i2c_scl_pin),
            &i2c_config,
        )
        .context("‼️ Failed to initialize I2C Driver")?;
        let i2c_shared_bus: SharedI2cBus = RefCell::new(i2c_driver);

        let wifi = WifiManager::new(peripherals.modem, sys_loop, nvs, config.wifi_retry_delay_ms)?;
        let publisher = SupabasePublisher::new(
            EspHttpTransport::default(),
            StationLink,
            EspClock,
            FreeRtos,
            &config,
        );

        let mut node = Node::new(config.clone(), wifi, publisher, EspDeepSleep, FreeRtos);

        match DhtPin::new(gpio(config.dht_pin)) {
            Ok(bus) => {
                node = node.with_sensor(
                    Dht11Sensor::new(bus, EspClock, FreeRtos, &config),
                    PublishPlan::Batch(&dht11::DATA_TYPES),
                );
            }
            Err(e) => log_sensor_error("DHT11", format!("GPIO setup failed: {:?}", e)),
        }

        match OneWireBus::new(gpio(config.ds18b20_pin)) {
            Ok(bus) => {
                node = node.with_sensor(
                    Ds18b20Sensor::new(bus, EspClock, FreeRtos, &config),
                    PublishPlan::Batch(&sensors::ds18b20::DATA_TYPES),
                );
            }
            Err(e) => log_sensor_error("DS18B20", format!("{:#}", e)),
        }

        node = node.with_sensor(
            Scd41Sensor::new(Scd4xI2c::new(&i2c_shared_bus), EspClock, FreeRtos, &config),
            PublishPlan::PrimaryOnly(scd41::DATA_TYPES[0]),
        );

        node.run_cycle();
        node.sleep()
    }
}
