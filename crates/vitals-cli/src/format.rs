//! Output formatting utilities for text and JSON output.

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use vitals_core::StatusEvent;
use vitals_types::{DiscoveredDevice, VitalChannel, VitalsSnapshot};

/// Render a value as compact single-line JSON.
pub fn to_json_line<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Format scan results as a table.
#[must_use]
pub fn format_scan_text(devices: &[DiscoveredDevice]) -> String {
    use tabled::settings::Style;
    use tabled::{Table, Tabled};

    if devices.is_empty() {
        return "No sensors found.\n".to_string();
    }

    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Identifier")]
        identifier: String,
        #[tabled(rename = "RSSI")]
        rssi: String,
        #[tabled(rename = "Connectable")]
        connectable: &'static str,
    }

    let rows: Vec<DeviceRow> = devices
        .iter()
        .map(|d| DeviceRow {
            name: d.name.clone(),
            identifier: d.id.clone(),
            rssi: format!("{} dBm", d.rssi_dbm),
            connectable: if d.is_connectable { "yes" } else { "no" },
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    format!("Found {} sensor(s)\n\n{}\n", devices.len(), table)
}

/// Format one snapshot as a text line. Channels that have not reported yet
/// print as `--`.
pub fn format_snapshot_text(snapshot: &VitalsSnapshot) -> String {
    let field = |channel: VitalChannel, value: f32| {
        if snapshot.received.contains(channel) {
            format!("{value:.1}")
        } else {
            "--".to_string()
        }
    };

    let quality = if snapshot.received.contains(VitalChannel::Status) {
        format!("{}%", snapshot.signal_quality)
    } else {
        "--".to_string()
    };

    format!(
        "[{}] HR {} bpm  BR {} bpm  dist {} cm  quality {}  presence {}",
        format_timestamp(snapshot.timestamp_ms),
        field(VitalChannel::HeartRate, snapshot.heart_rate_bpm),
        field(VitalChannel::BreathRate, snapshot.breath_rate_bpm),
        field(VitalChannel::Distance, snapshot.distance_cm),
        quality,
        if snapshot.presence_detected { "yes" } else { "no" },
    )
}

/// Format a status event as a short text line.
pub fn format_status_text(event: &StatusEvent) -> String {
    match event {
        StatusEvent::Connection {
            status,
            cause: Some(cause),
        } => format!("status: {status} ({cause})"),
        StatusEvent::Connection { status, cause: None } => format!("status: {status}"),
        StatusEvent::Sensor { record, .. } => format!(
            "sensor: ready={} valid={} quality={}% uptime={}s updates={}",
            record.sensor_ready,
            record.data_valid,
            record.signal_quality,
            record.uptime_seconds,
            record.update_count
        ),
        StatusEvent::Adapter { state } => format!("adapter: {state}"),
        _ => format!("{event:?}"),
    }
}

/// Format milliseconds since the Unix epoch as RFC 3339 (UTC).
pub fn format_timestamp(timestamp_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(timestamp_ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_types::{ChannelPresence, ConnectionStatus, StatusRecord};

    fn snapshot() -> VitalsSnapshot {
        let mut received = ChannelPresence::default();
        received.insert(VitalChannel::HeartRate);
        received.insert(VitalChannel::Distance);
        VitalsSnapshot {
            heart_rate_bpm: 72.04,
            breath_rate_bpm: 0.0,
            distance_cm: 88.5,
            signal_quality: 0,
            presence_detected: true,
            timestamp_ms: 0,
            received,
        }
    }

    #[test]
    fn test_scan_table() {
        let devices = vec![
            DiscoveredDevice {
                id: "AA:BB:CC:DD:EE:FF".into(),
                name: "Vitals Radar".into(),
                rssi_dbm: -61,
                is_connectable: true,
            },
            DiscoveredDevice {
                id: "11:22:33:44:55:66".into(),
                name: "Vitals".into(),
                rssi_dbm: -90,
                is_connectable: false,
            },
        ];
        let text = format_scan_text(&devices);
        assert!(text.starts_with("Found 2 sensor(s)"));
        for header in ["Name", "Identifier", "RSSI", "Connectable"] {
            assert!(text.contains(header), "missing column {header}");
        }

        let row = |id: &str| {
            text.lines()
                .find(|line| line.contains(id))
                .unwrap_or_else(|| panic!("no row for {id}"))
                .to_string()
        };
        let first = row("AA:BB:CC:DD:EE:FF");
        assert!(first.contains("Vitals Radar"));
        assert!(first.contains("-61 dBm"));
        assert!(first.contains("yes"));
        assert!(row("11:22:33:44:55:66").contains("no"));
        assert_eq!(format_scan_text(&[]), "No sensors found.\n");
    }

    #[test]
    fn test_snapshot_line_marks_missing_channels() {
        let line = format_snapshot_text(&snapshot());
        assert!(line.starts_with("[1970-01-01T00:00:00Z]"));
        assert!(line.contains("HR 72.0 bpm"));
        assert!(line.contains("BR -- bpm"));
        assert!(line.contains("dist 88.5 cm"));
        assert!(line.contains("quality --"));
        assert!(line.ends_with("presence yes"));
    }

    #[test]
    fn test_snapshot_json() {
        let json = to_json_line(&snapshot()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["distance_cm"], 88.5);
        assert_eq!(value["presence_detected"], true);
        assert_eq!(value["received"]["heart_rate"], true);
        assert_eq!(value["received"]["status"], false);
    }

    #[test]
    fn test_status_lines() {
        let line = format_status_text(&StatusEvent::Connection {
            status: ConnectionStatus::Error,
            cause: Some("Bluetooth adapter is off".into()),
        });
        assert_eq!(line, "status: error (Bluetooth adapter is off)");

        let line = format_status_text(&StatusEvent::Sensor {
            record: StatusRecord {
                sensor_ready: true,
                data_valid: true,
                signal_quality: 72,
                uptime_seconds: 1_006_632_960,
                update_count: 5,
            },
            signal_quality: 72,
        });
        assert!(line.contains("uptime=1006632960s"));
        assert!(line.contains("updates=5"));
    }
}
