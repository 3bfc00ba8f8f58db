//! PourLogic tap firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter    NvsEeprom    TcpTransport   WifiAdapter         │
//! │  (Config+NVS)  (ByteStore)  (Transport)                        │
//! │  Esp32Time     LogEventSink Em4100Reader   SolenoidValve       │
//! │  (Clock)       (EventSink)  (TagReader)    (ValvePort)         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  PourStation                                           │    │
//! │  │  PourLogicClient (OtpCounter) · FlowMeter (pulse ISR)  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use log::{error, info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyIOPin, AnyInputPin, AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::uart::{UartDriver, config::Config as UartConfig};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::nvs::EspDefaultNvsPartition;

use pourlogic::adapters::eeprom::NvsEeprom;
use pourlogic::adapters::log_sink::LogEventSink;
use pourlogic::adapters::nvs::{NvsAdapter, PASSPHRASE_KEY, WIFI_PASSWORD_KEY};
use pourlogic::adapters::tcp_transport::TcpTransport;
use pourlogic::adapters::time::Esp32TimeAdapter;
use pourlogic::adapters::wifi::{WifiAdapter, WifiCredentials};
use pourlogic::app::ports::{Clock, ConfigPort};
use pourlogic::app::service::PourStation;
use pourlogic::auth::counter::OtpCounter;
use pourlogic::client::PourLogicClient;
use pourlogic::config::SystemConfig;
use pourlogic::drivers::hw_init::{self, FlowPulseIrq};
use pourlogic::drivers::rfid::Em4100Reader;
use pourlogic::drivers::valve::SolenoidValve;
use pourlogic::pins;
use pourlogic::sensors::flow::FlowMeter;

/// Back-off between pour cycles after a network failure.
const RETRY_DELAY_MS: u32 = 2_000;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PourLogic tap v{}                ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Hardware peripherals ───────────────────────────────
    if let Err(e) = hw_init::init_peripherals() {
        // Without the flow input the valve must never open; halt until the
        // watchdog resets us.
        error!("HAL init failed: {}, halting", e);
        #[allow(clippy::empty_loop)]
        loop {}
    }
    hw_init::init_isr_service()?;

    // ── 3. Load config and secrets from NVS ──────────────────
    let mut nvs = match NvsAdapter::new() {
        Ok(n) => n,
        Err(e) => {
            warn!("NVS init failed ({}), running with defaults and no persistence", e);
            NvsAdapter::default()
        }
    };
    let config = match nvs.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };
    match serde_json::to_string(&config) {
        Ok(json) => info!("Config: {}", json),
        Err(e) => warn!("Config: not printable ({})", e),
    }
    // Build-time secrets are written to the `auth` namespace once; later
    // images built without them keep what is already provisioned.
    for (key, value) in [
        (PASSPHRASE_KEY, option_env!("POURLOGIC_PASSPHRASE")),
        (WIFI_PASSWORD_KEY, option_env!("WIFI_PASS")),
    ] {
        if let Err(e) = nvs.provision_credential(key, value) {
            warn!("Credential '{}' not provisioned: {}", key, e);
        }
    }
    let passphrase = nvs.passphrase();
    let wifi_password = nvs.wifi_password();

    // ── 4. Network ────────────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let mut wifi = WifiAdapter::new(peripherals.modem, sysloop, EspDefaultNvsPartition::take()?)?;
    wifi.set_credentials(WifiCredentials::new(&config.wifi_ssid, &wifi_password)?);
    if let Err(e) = wifi.connect() {
        warn!("WiFi: initial connect failed ({}), retrying in the pour loop", e);
    }

    // ── 5. Construct adapters ─────────────────────────────────
    // SAFETY: each GPIO number is claimed exactly once, here.
    let (valve_pin, enable_pin, rx_pin, tx_pin) = unsafe {
        (
            AnyOutputPin::new(pins::VALVE_GPIO),
            AnyOutputPin::new(pins::RFID_ENABLE_GPIO),
            AnyInputPin::new(pins::RFID_RX_GPIO),
            AnyOutputPin::new(pins::RFID_TX_GPIO),
        )
    };
    let valve = SolenoidValve::new(PinDriver::output(valve_pin)?);
    let uart = UartDriver::new(
        peripherals.uart1,
        tx_pin,
        rx_pin,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::new().baudrate(Hertz(pins::RFID_BAUD)),
    )?;
    let reader = Em4100Reader::new(PinDriver::output(enable_pin)?, uart, Esp32TimeAdapter::new());

    let calibration = config.flow_calibration().unwrap_or_default();
    let meter = FlowMeter::new(FlowPulseIrq::new(), calibration);

    let counter = OtpCounter::begin(NvsEeprom::new(nvs), usize::from(config.counter_offset));
    let client = PourLogicClient::new(
        config.client_id,
        &passphrase,
        counter,
        TcpTransport::new(config.server.socket_timeout_ms),
        config.server.clone(),
    );

    let mut station = PourStation::new(client, meter, valve, reader, &config);
    let mut clock = Esp32TimeAdapter::new();
    let mut sink = LogEventSink::new();

    // ── 6. Pour loop ──────────────────────────────────────────
    station.announce_ready(&mut sink);
    loop {
        if let Err(e) = wifi.ensure_connected() {
            warn!("WiFi unavailable ({}), retrying", e);
            clock.sleep_ms(RETRY_DELAY_MS);
            continue;
        }
        if let Some(cycle) = station.run_cycle(&mut clock, &mut sink) {
            info!("Cycle done: tag={} volume={:.2}mL", cycle.tag, cycle.volume_ml());
        }
    }
}
