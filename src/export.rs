//! CSV export of observed packets.

use crate::packet::{PacketRecord, Protocol};
use core::fmt::Write as _;
use std::io::{self, Write};

pub const CSV_HEADER: &str =
    "index,time,protocol,source_ip,source_port,destination_ip,destination_port,length";

/// Writes one CSV row per packet, numbering rows from 1.
pub struct CsvExporter<W: Write> {
    writer: W,
    rows: u64,
}

impl<W: Write> CsvExporter<W> {
    /// Write the header line and return the exporter.
    pub fn new(mut writer: W) -> io::Result<Self> {
        writeln!(writer, "{CSV_HEADER}")?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn write_record(&mut self, record: &PacketRecord) -> io::Result<()> {
        self.rows += 1;
        writeln!(self.writer, "{}", csv_row(self.rows, record))
    }

    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Format one packet as a CSV row. Addresses are empty when the frame did not
/// carry them and ports are empty for non-transport frames.
#[must_use]
pub fn csv_row(index: u64, record: &PacketRecord) -> String {
    let mut row = format!("{index},{},{},", record.timestamp.clock(), record.protocol);
    let has_ports = record.protocol.is_tcp() || record.protocol == Protocol::Udp;

    for (ip, port) in [
        (record.src_ip, record.src_port),
        (record.dst_ip, record.dst_port),
    ] {
        if let Some(ip) = ip {
            let _ = write!(row, "{ip}");
        }
        row.push(',');
        if has_ports {
            let _ = write!(row, "{port}");
        }
        row.push(',');
    }
    let _ = write!(row, "{}", record.frame_len);
    row
}
