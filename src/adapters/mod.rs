//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter         | Implements         | Connects to               |
//! |-----------------|--------------------|---------------------------|
//! | `eeprom`        | ByteStore          | NVS blob (emulated EEPROM)|
//! | `log_sink`      | EventSink          | Serial log output         |
//! | `nvs`           | ConfigPort         | NVS / in-memory store     |
//! |                 | StoragePort        |                           |
//! | `tcp_transport` | Transport          | lwIP / host TCP socket    |
//! | `time`          | Clock              | ESP32 system timer        |
//! | `wifi`          | (station)          | ESP-IDF WiFi STA          |

pub mod eeprom;
pub mod log_sink;
pub mod nvs;
pub mod tcp_transport;
pub mod time;
pub mod wifi;
