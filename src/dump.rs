//! Text rendering of decoded datagrams: one-line summaries and offset hex dumps.

use crate::frame::{DecodedDatagram, Envelope};
use crate::record::MessageRecord;
use std::io::Write;

const MICROS_PER_DAY: u64 = 86_400 * 1_000_000;

/// Microseconds into the week as `dN HH:MM:SS.mmm`.
pub fn format_week_time(microseconds: u64) -> String {
    let day = microseconds / MICROS_PER_DAY;
    let rem = microseconds % MICROS_PER_DAY;
    let secs = rem / 1_000_000;
    let millis = (rem % 1_000_000) / 1000;
    format!(
        "d{} {:02}:{:02}:{:02}.{:03}",
        day,
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis
    )
}

pub fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Hex dump, 16 bytes per line, each line prefixed with its byte offset.
pub fn write_hex_with_offset(w: &mut dyn Write, bytes: &[u8]) -> std::io::Result<()> {
    const COLS: usize = 16;
    for (i, chunk) in bytes.chunks(COLS).enumerate() {
        writeln!(w, "  offset {:4}: {}", i * COLS, hex_string(chunk))?;
    }
    Ok(())
}

/// One line describing the envelope and the record kind.
pub fn record_summary(envelope: &Envelope, record: &MessageRecord) -> String {
    let mut line = format!(
        "{} ({:#010x}) counter={} len={}",
        record.kind_name(),
        record.type_id(),
        envelope.header.counter,
        envelope.header.declared_total()
    );
    if envelope.timestamp.utc_valid != 0 {
        line.push_str(&format!(
            " utc=w{} {}",
            envelope.timestamp.utc_week,
            format_week_time(envelope.timestamp.utc_microseconds)
        ));
    }
    if envelope.multi_part.is_split() {
        line.push_str(&format!(
            " part={}/{} bundle={:#x}",
            envelope.multi_part.part_index + 1,
            envelope.multi_part.part_count,
            envelope.multi_part.bundle_id
        ));
    }
    if let Some(profile) = record.profile() {
        line.push_str(&format!(" instance={} path={}", profile.instance_id, profile.path_id));
    }
    if let Some(n) = record.item_count() {
        line.push_str(&format!(" items={}", n));
    }
    line
}

/// Summary line, then a hex dump of the payload for records with no decoder.
pub fn write_datagram(w: &mut dyn Write, datagram: &DecodedDatagram) -> std::io::Result<()> {
    writeln!(
        w,
        "=== datagram {}  {}",
        datagram.index,
        record_summary(&datagram.envelope, &datagram.record)
    )?;
    if let MessageRecord::Unknown { payload, .. } = &datagram.record {
        write_hex_with_offset(w, payload)?;
    }
    Ok(())
}
