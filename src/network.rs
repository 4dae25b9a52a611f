//! Station-mode network link.
//!
//! The cycle connects once per boot and disconnects before deep sleep; the
//! publisher only needs the live [`LinkStatus`] view.

/// Live connectivity check, evaluated on every call.
pub trait LinkStatus {
    fn is_connected(&self) -> bool;
}

impl<L: LinkStatus + ?Sized> LinkStatus for &L {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

pub trait NetworkLink: LinkStatus {
    /// Join `ssid`, giving up after `timeout_ms`.
    fn connect(&mut self, ssid: &str, password: &str, timeout_ms: u32) -> anyhow::Result<()>;

    /// Leave the network. Safe to call when not connected.
    fn disconnect(&mut self);
}

#[cfg(target_os = "espidf")]
pub use esp::{StationLink, WifiManager};

#[cfg(target_os = "espidf")]
mod esp {
    use super::{LinkStatus, NetworkLink};
    use anyhow::{Context, Result};
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys;
    use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration as WifiConfig, EspWifi};
    use log::{info, warn};

    /// Connectivity probe that asks the WiFi driver directly, so any component
    /// can hold one without sharing the driver.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct StationLink;

    impl StationLink {
        /// Signal strength of the current access point, 0 when not associated.
        pub fn rssi(&self) -> i32 {
            let mut ap_info = sys::wifi_ap_record_t::default();
            match sys::esp!(unsafe { sys::esp_wifi_sta_get_ap_info(&mut ap_info) }) {
                Ok(()) => i32::from(ap_info.rssi),
                Err(_) => 0,
            }
        }
    }

    impl LinkStatus for StationLink {
        fn is_connected(&self) -> bool {
            let mut ap_info = sys::wifi_ap_record_t::default();
            sys::esp!(unsafe { sys::esp_wifi_sta_get_ap_info(&mut ap_info) }).is_ok()
        }
    }

    pub struct WifiManager {
        wifi: EspWifi<'static>,
        retry_delay_ms: u32,
    }

    impl WifiManager {
        pub fn new(
            modem: Modem,
            sys_loop: EspSystemEventLoop,
            nvs: EspDefaultNvsPartition,
            retry_delay_ms: u32,
        ) -> Result<Self> {
            let wifi = EspWifi::new(modem, sys_loop, Some(nvs)).context("‼️ Failed to init WiFi driver")?;
            Ok(Self { wifi, retry_delay_ms })
        }

        fn print_connection_info(&self) -> Result<()> {
            let ip_info = self.wifi.sta_netif().get_ip_info()?;
            info!("📶 IP Address: {}", ip_info.ip);
            info!("📶 Signal Strength: {} dBm", StationLink.rssi());
            Ok(())
        }
    }

    impl LinkStatus for WifiManager {
        fn is_connected(&self) -> bool {
            self.wifi.is_connected().unwrap_or(false)
        }
    }

    impl NetworkLink for WifiManager {
        fn connect(&mut self, ssid: &str, password: &str, timeout_ms: u32) -> Result<()> {
            info!("📶 Connecting to: {}", ssid);

            self.wifi.set_configuration(&WifiConfig::Client(ClientConfiguration {
                ssid: ssid
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("SSID is too long"))?,
                password: password
                    .try_into()
                    .map_err(|_| anyhow::anyhow!("Password is too long"))?,
                auth_method: if password.is_empty() {
                    AuthMethod::None
                } else {
                    AuthMethod::WPA2Personal
                },
                ..Default::default()
            }))?;
            self.wifi.start()?;
            info!("📶 WiFi starting...");

            if let Err(e) = self.wifi.connect() {
                warn!("📶 Connect call failed: {:?}", e);
            }

            let mut waited_ms = 0;
            while !self.is_connected() {
                if waited_ms >= timeout_ms {
                    anyhow::bail!("WiFi connection timeout after {}ms", timeout_ms);
                }
                FreeRtos::delay_ms(self.retry_delay_ms);
                waited_ms += self.retry_delay_ms;
            }

            // Associated is not enough for HTTP; wait for DHCP as well.
            while !self.wifi.is_up()? {
                if waited_ms >= timeout_ms {
                    anyhow::bail!("WiFi got no IP address within {}ms", timeout_ms);
                }
                FreeRtos::delay_ms(self.retry_delay_ms);
                waited_ms += self.retry_delay_ms;
            }

            info!("📶 WiFi connected successfully!");
            if let Err(e) = self.print_connection_info() {
                warn!("📶 Could not read connection info: {:?}", e);
            }
            Ok(())
        }

        fn disconnect(&mut self) {
            if self.is_connected() {
                info!("📶 Disconnecting WiFi...");
                if let Err(e) = self.wifi.disconnect() {
                    warn!("📶 Disconnect failed: {:?}", e);
                }
            }
            if let Err(e) = self.wifi.stop() {
                warn!("📶 WiFi stop failed: {:?}", e);
            }
        }
    }
}
