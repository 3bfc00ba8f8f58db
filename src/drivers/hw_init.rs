//! One-shot hardware peripheral initialization.
//!
//! Configures the flow sensor input and installs the GPIO ISR service
//! using raw ESP-IDF sys calls.  Called once from `main()` before the pour
//! loop starts.  The valve and the RFID enable line are plain outputs
//! owned by `PinDriver`s in `main()`.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::app::ports::PulseInterrupt;
#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrHandlerFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrHandlerFailed(rc) => write!(f, "GPIO ISR handler add failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

#[cfg(target_os = "espidf")]
pub fn init_peripherals() -> Result<(), HwInitError> {
    // SAFETY: Called once from main() before the pour loop; single-threaded.
    unsafe { init_flow_input()? };
    info!("hw_init: all peripherals configured");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_peripherals() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): peripheral init skipped");
    Ok(())
}

// ── Flow sensor input ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe fn init_flow_input() -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FLOW_PULSE_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_POSEDGE,
    };
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    // Stays masked until a meter starts reading.
    unsafe { gpio_intr_disable(pins::FLOW_PULSE_GPIO) };
    info!("hw_init: flow input configured (GPIO{})", pins::FLOW_PULSE_GPIO);
    Ok(())
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn flow_gpio_isr(_arg: *mut core::ffi::c_void) {
    crate::sensors::flow::pulse_isr();
}

/// Install the per-pin GPIO ISR service and register the flow handler.
/// Call after init_peripherals().
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed.  The handler is a static function that
    // only touches the critical-section guarded pulse slot.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        let ret = gpio_isr_handler_add(
            pins::FLOW_PULSE_GPIO,
            Some(flow_gpio_isr),
            core::ptr::null_mut(),
        );
        if ret != ESP_OK as i32 {
            return Err(HwInitError::IsrHandlerFailed(ret));
        }
    }
    info!("hw_init: ISR service installed (flow)");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}

// ── Flow interrupt gate ───────────────────────────────────────

/// Unmasks / masks the flow GPIO interrupt for a [`FlowMeter`].
///
/// [`FlowMeter`]: crate::sensors::flow::FlowMeter
#[derive(Debug, Default)]
pub struct FlowPulseIrq {
    attached: bool,
}

impl FlowPulseIrq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl PulseInterrupt for FlowPulseIrq {
    #[cfg(target_os = "espidf")]
    fn attach(&mut self) {
        // SAFETY: the pin was configured in init_flow_input(); enabling the
        // interrupt is a register write.
        unsafe { gpio_intr_enable(pins::FLOW_PULSE_GPIO) };
        self.attached = true;
    }

    #[cfg(target_os = "espidf")]
    fn detach(&mut self) {
        // SAFETY: see attach().
        unsafe { gpio_intr_disable(pins::FLOW_PULSE_GPIO) };
        self.attached = false;
    }

    #[cfg(not(target_os = "espidf"))]
    fn attach(&mut self) {
        self.attached = true;
    }

    #[cfg(not(target_os = "espidf"))]
    fn detach(&mut self) {
        self.attached = false;
    }
}
