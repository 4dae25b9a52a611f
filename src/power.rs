//! Deep sleep and the boot counter that survives it.

/// Timer-driven low-power state. Waking up resets the chip, so nothing after
/// [`DeepSleep::enter`] runs.
pub trait DeepSleep {
    fn arm_timer(&mut self, duration_s: u64) -> anyhow::Result<()>;

    fn enter(&mut self) -> !;

    /// Last resort when the sleep timer cannot be armed.
    fn restart(&mut self) -> !;
}

/// Counter kept in memory that is retained across deep sleep.
pub trait BootCounter {
    /// Count this boot and return the new total.
    fn increment(&mut self) -> u32;
}

#[cfg(target_os = "espidf")]
pub use esp::{EspDeepSleep, RtcBootCounter, free_heap_bytes, wakeup_cause};

#[cfg(target_os = "espidf")]
mod esp {
    use super::{BootCounter, DeepSleep};
    use anyhow::Context;
    use core::sync::atomic::{AtomicU32, Ordering};
    use esp_idf_svc::hal::reset;
    use esp_idf_svc::sys;
    use log::info;

    // Lives in RTC slow memory: zeroed on power-on, kept through deep sleep.
    #[unsafe(link_section = ".rtc.data.boot_count")]
    static BOOT_COUNT: AtomicU32 = AtomicU32::new(0);

    #[derive(Debug, Default)]
    pub struct RtcBootCounter;

    impl BootCounter for RtcBootCounter {
        fn increment(&mut self) -> u32 {
            // Single core, single thread: plain load/store is enough.
            let count = BOOT_COUNT.load(Ordering::Relaxed).wrapping_add(1);
            BOOT_COUNT.store(count, Ordering::Relaxed);
            count
        }
    }

    #[derive(Debug, Default)]
    pub struct EspDeepSleep;

    impl DeepSleep for EspDeepSleep {
        fn arm_timer(&mut self, duration_s: u64) -> anyhow::Result<()> {
            let micros = duration_s
                .checked_mul(1_000_000)
                .context("Sleep duration overflows the wake-up timer")?;
            sys::esp!(unsafe { sys::esp_sleep_enable_timer_wakeup(micros) })
                .context("‼️ Failed to arm the wake-up timer")?;
            info!("💤 Wake-up timer armed for {} seconds", duration_s);
            Ok(())
        }

        #[allow(unreachable_code)]
        fn enter(&mut self) -> ! {
            info!("💤 Entering deep sleep now");
            unsafe { sys::esp_deep_sleep_start() };
            reset::restart()
        }

        fn restart(&mut self) -> ! {
            reset::restart()
        }
    }

    pub fn wakeup_cause() -> &'static str {
        #[allow(non_upper_case_globals)]
        match unsafe { sys::esp_sleep_get_wakeup_cause() } {
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => "timer",
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0
            | sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1
            | sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO => "external pin",
            sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => "power-on or reset",
            _ => "other",
        }
    }

    pub fn free_heap_bytes() -> u32 {
        unsafe { sys::esp_get_free_heap_size() }
    }
}
