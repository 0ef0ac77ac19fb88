//! Decoder tests over synthetic datagrams: envelope, every message kind, count rules, failures.

use ehpdecode::dump::write_datagram;
use ehpdecode::layout::{CountRule, Preamble};
use ehpdecode::registry::STRATEGIES;
use ehpdecode::{
    decode_batch, decode_message, decode_message_with_warnings, DecodeError, DecodeWarning, MessageKind,
    MessageRecord,
};

/// Little-endian byte builder.
#[derive(Default)]
struct Bytes(Vec<u8>);

impl Bytes {
    fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }
    fn u16(mut self, v: u16) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u32(mut self, v: u32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn i32(mut self, v: i32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn f32(mut self, v: f32) -> Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn raw(mut self, v: &[u8]) -> Self {
        self.0.extend_from_slice(v);
        self
    }
}

/// 44-byte envelope followed by `body`; the declared length matches the buffer.
fn datagram(type_id: u32, body: &[u8]) -> Vec<u8> {
    datagram_with_length(type_id, body, (32 + body.len()) as u16)
}

fn datagram_with_length(type_id: u32, body: &[u8], length: u16) -> Vec<u8> {
    Bytes::default()
        .u16(length)
        .u16(1)
        .u32(type_id)
        .u32(0)
        // timestamp block
        .u8(0)
        .u8(1)
        .u16(2300)
        .u64(3_600_000_000)
        .u64(0)
        // single-part descriptor
        .u16(1)
        .u16(0)
        .u32(0)
        // sub-protocol header
        .raw(&[0, 5, (type_id & 0xff) as u8, 1])
        .raw(body)
        .0
}

fn profile(instance_id: u32) -> Bytes {
    Bytes::default()
        .u32(instance_id)
        .u8(0)
        .u8(1)
        .f32(0.5)
        .u32(8)
        .u8(2)
        .u32(100)
        .u32(250)
        .u8(1)
        .u8(0)
        .u8(3)
        .u8(1)
}

fn curvature(count: u8, points: &[(u32, f32)]) -> Vec<u8> {
    let mut b = profile(42).u8(count);
    for (offset, c) in points {
        b = b.u32(*offset).f32(*c);
    }
    b.0
}

#[test]
fn test_every_kind_decodes_into_its_variant() {
    for s in STRATEGIES.iter() {
        let layout = &s.layout;
        let prefix = layout.element_start() - 44;
        let mut body = vec![0u8; prefix];
        if layout.preamble == Preamble::Profile {
            body[..27].copy_from_slice(&profile(7).0);
        }
        let mut expected_items = None;
        if let Some(block) = &layout.repeated {
            let n = match block.count {
                CountRule::Fixed(n) => n,
                _ => 2,
            };
            if block.count.is_explicit() {
                let last = layout.fixed.last().expect("explicit count needs a field");
                let at = prefix - last.width();
                body[at..at + last.width()].copy_from_slice(&(n as u64).to_le_bytes()[..last.width()]);
            }
            let size = layout.element_size().expect("element size");
            body.extend((0..n * size).map(|i| i as u8));
            expected_items = Some(n);
        }
        let buf = datagram(s.kind.type_id(), &body);
        let (record, warnings) =
            decode_message_with_warnings(&buf).unwrap_or_else(|e| panic!("{}: {}", s.kind, e));
        assert_eq!(record.kind(), Some(s.kind), "{}", s.kind);
        assert_eq!(record.type_id(), s.kind.type_id());
        assert!(warnings.is_empty(), "{}: {:?}", s.kind, warnings);
        assert_eq!(record.item_count(), expected_items, "{}", s.kind);
        assert_eq!(record.profile().is_some(), layout.preamble == Preamble::Profile);
        if let Some(p) = record.profile() {
            assert_eq!(p.instance_id, 7);
            assert_eq!(p.end_offset, 250);
        }
    }
}

#[test]
fn test_form_of_way_fields() {
    let body = profile(0x0102_0304).u8(4).0;
    let buf = datagram(MessageKind::FormOfWay.type_id(), &body);
    let MessageRecord::FormOfWay(m) = decode_message(&buf).expect("decode") else {
        panic!("wrong variant");
    };
    assert_eq!(m.profile.instance_id, 0x0102_0304);
    assert!(!m.profile.retransmit);
    assert_eq!(m.profile.change_flag, 1);
    assert_eq!(m.profile.confidence, 0.5);
    assert_eq!(m.profile.path_id, 8);
    assert_eq!(m.profile.lane_number, 2);
    assert_eq!(m.profile.offset, 100);
    assert!(m.profile.end_offset_final);
    assert_eq!(m.profile.profile_type, 3);
    assert!(m.profile.available);
    assert_eq!(m.body.link_form_of_way, 4);
}

#[test]
fn test_decoding_is_idempotent() {
    let fow = datagram(MessageKind::FormOfWay.type_id(), &profile(9).u8(2).0);
    let frc = datagram(MessageKind::FunctionalRoadClass.type_id(), &profile(9).u8(5).0);
    for buf in [fow, frc] {
        let a = decode_message(&buf).expect("first");
        let b = decode_message(&buf).expect("second");
        assert_eq!(a, b);
    }
}

#[test]
fn test_short_buffers_are_truncated() {
    let full = datagram(MessageKind::FormOfWay.type_id(), &profile(1).u8(1).0);
    for len in 0..44 {
        let err = decode_message(&full[..len]).unwrap_err();
        assert!(
            matches!(err, DecodeError::TruncatedBuffer { available, .. } if available == len),
            "len {}: {}",
            len,
            err
        );
    }
    // Envelope present but the profile is cut short.
    assert!(decode_message(&full[..60]).unwrap_err().is_truncated());
}

#[test]
fn test_curvature_explicit_count() {
    let body = curvature(2, &[(10, 0.001), (20, -0.002)]);
    let buf = datagram(MessageKind::Curvature.type_id(), &body);
    let (record, warnings) = decode_message_with_warnings(&buf).expect("decode");
    assert!(warnings.is_empty());
    let MessageRecord::Curvature(m) = record else {
        panic!("wrong variant");
    };
    assert_eq!(m.header.count, 2);
    assert_eq!(m.items.len(), 2);
    assert_eq!(m.items[1].offset, 20);
    assert_eq!(m.items[1].curvature, -0.002);
}

#[test]
fn test_explicit_count_disagreement_warns_once() {
    let body = curvature(2, &[(1, 0.1), (2, 0.2), (3, 0.3)]);
    let buf = datagram(MessageKind::Curvature.type_id(), &body);
    let (record, warnings) = decode_message_with_warnings(&buf).expect("decode");
    assert_eq!(
        warnings,
        vec![DecodeWarning::LengthInconsistency {
            kind: MessageKind::Curvature,
            implied: 3,
            explicit: 2
        }]
    );
    assert_eq!(record.item_count(), Some(2));
}

#[test]
fn test_explicit_count_past_buffer_is_truncated() {
    let body = curvature(3, &[(1, 0.1), (2, 0.2)]);
    let buf = datagram(MessageKind::Curvature.type_id(), &body);
    assert!(decode_message(&buf).unwrap_err().is_truncated());
}

#[test]
fn test_partial_element_is_layout_mismatch() {
    let cases: [(MessageKind, Vec<u8>); 4] = [
        (MessageKind::Curvature, curvature(1, &[(1, 0.5)])),
        (MessageKind::LaneModel, profile(1).u8(1).raw(&[0u8; 23]).0),
        (MessageKind::LinearObjects, profile(1).u8(2).raw(&[0u8; 16]).0),
        (
            MessageKind::LanesGeometry,
            profile(1).u8(1).u32(77).u8(0).u8(1).i32(1).i32(2).i32(3).0,
        ),
    ];
    for (kind, mut body) in cases {
        assert!(decode_message(&datagram(kind.type_id(), &body)).is_ok(), "{}", kind);
        body.push(0xFF);
        let err = decode_message(&datagram(kind.type_id(), &body)).unwrap_err();
        assert!(err.is_layout_mismatch(), "{}: {}", kind, err);
    }
}

#[test]
fn test_declared_length_drives_count() {
    // Two lanes on the wire, but the header only declares one.
    let body = profile(1).u8(2).raw(&[1u8; 46]).0;
    let declared = (32 + body.len() - 23) as u16;
    let buf = datagram_with_length(MessageKind::LaneModel.type_id(), &body, declared);
    let MessageRecord::LaneModel(m) = decode_message(&buf).expect("decode") else {
        panic!("wrong variant");
    };
    assert_eq!(m.header.count, 2);
    assert_eq!(m.items.len(), 1);
}

#[test]
fn test_location_fixed_layout() {
    let body = Bytes::default()
        // relative position
        .u64(0xAABB)
        .u64(0xCCDD)
        .u8(3)
        .u32(150)
        .u32(175)
        .f32(0.25)
        .f32(-0.25)
        // absolute position
        .i32(1_213_000_000)
        .i32(312_000_000)
        .f32(90.0)
        .f32(0.1)
        .f32(0.2)
        .u8(80)
        .raw(&[0u8; 24])
        // geofence
        .u8(1)
        .u8(2)
        // position
        .u64(1_700_000_000_000)
        .u64(15)
        .u32(8)
        .u32(1234)
        .u32(5)
        .i32(-3)
        .f32(16.5)
        .f32(0.0)
        .f32(0.9)
        .u8(2)
        .u32(8)
        // fail-safe
        .raw(&[0, 1, 0, 0, 0, 7])
        .0;
    assert_eq!(body.len(), 179 - 44);
    let MessageRecord::Location(loc) = decode_message(&datagram(0x0300_0001, &body)).expect("decode") else {
        panic!("wrong variant");
    };
    assert_eq!(loc.relative.road_id, 0xAABB);
    assert_eq!(loc.relative.lane_seq, 3);
    assert_eq!(loc.absolute.lon, 1_213_000_000);
    assert_eq!(loc.absolute.confidence, 80);
    assert_eq!(loc.geofence.judge_type, 2);
    assert_eq!(loc.position.deviation, -3);
    assert_eq!(loc.position.speed, 16.5);
    assert_eq!(loc.position.prefer_path, 8);
    assert_eq!(loc.fail_safe.gnss_status, 1);
    assert_eq!(loc.fail_safe.imu_status, 7);
}

#[test]
fn test_route_list_ids() {
    let body = Bytes::default().u32(20240101).u16(3).u32(11).u32(12).u32(13).0;
    let record = decode_message(&datagram(MessageKind::RouteList.type_id(), &body)).expect("decode");
    let MessageRecord::RouteList(m) = &record else {
        panic!("wrong variant");
    };
    assert_eq!(m.header.hdmap_version, 20240101);
    assert_eq!(record.id_sequence(), Some(&[11u32, 12, 13][..]));
}

#[test]
fn test_route_list_trailing_pad_byte_warns() {
    let body = Bytes::default().u32(7).u16(2).u32(21).u32(22).u8(0).0;
    let buf = datagram(MessageKind::RouteList.type_id(), &body);
    let (record, warnings) = decode_message_with_warnings(&buf).expect("decode");
    assert_eq!(record.id_sequence(), Some(&[21u32, 22][..]));
    assert_eq!(
        warnings,
        vec![DecodeWarning::LengthInconsistency {
            kind: MessageKind::RouteList,
            implied: 2,
            explicit: 2
        }]
    );

    // A zeroed length field no longer decides the count.
    let buf = datagram_with_length(MessageKind::RouteList.type_id(), &body, 0);
    let (record, warnings) = decode_message_with_warnings(&buf).expect("decode");
    assert_eq!(record.item_count(), Some(2));
    assert_eq!(warnings.len(), 1);
}

#[test]
fn test_traffic_sign_has_nine_points() {
    let mut b = profile(5).u8(3).u8(1);
    for i in 0..9 {
        b = b.i32(i).i32(-i).i32(i * 10);
    }
    let MessageRecord::TrafficSign(m) =
        decode_message(&datagram(MessageKind::TrafficSign.type_id(), &b.0)).expect("decode")
    else {
        panic!("wrong variant");
    };
    assert_eq!(m.header.sign_type, 3);
    assert_eq!(m.items.len(), 9);
    assert_eq!(m.items[8].alt, 80);
}

#[test]
fn test_unknown_type_id() {
    let buf = datagram(0x0300_0016, &[1, 2, 3]);
    match decode_message(&buf).expect("decode") {
        MessageRecord::Unknown { type_id, payload } => {
            assert_eq!(type_id, 0x0300_0016);
            assert_eq!(payload, buf);
        }
        other => panic!("expected Unknown, got {}", other.kind_name()),
    }
    let bare = datagram(0x0900_0000, &[]);
    assert_eq!(bare.len(), 44);
    assert_eq!(decode_message(&bare).expect("decode").type_id(), 0x0900_0000);
}

#[test]
fn test_batch_continues_past_failures() {
    let good = datagram(MessageKind::Tunnel.type_id(), &profile(1).u8(1).0);
    let short = good[..20].to_vec();
    let unknown = datagram(0x0300_001C, &[0xAB; 20]);
    let bad = datagram(MessageKind::LaneModel.type_id(), &profile(1).u8(1).raw(&[0u8; 5]).0);
    let batch = vec![good.clone(), short, unknown, bad, good];
    let result = decode_batch(batch.iter().map(Vec::as_slice));

    let decoded: Vec<usize> = result.decoded.iter().map(|d| d.index).collect();
    let rejected: Vec<usize> = result.rejected.iter().map(|r| r.index).collect();
    assert_eq!(decoded, vec![0, 2, 4]);
    assert_eq!(rejected, vec![1, 3]);
    assert!(result.rejected[0].reason.is_truncated());
    assert!(result.rejected[1].reason.is_layout_mismatch());
    assert_eq!(result.decoded[0].envelope.header.counter, 1);

    let mut out = Vec::new();
    write_datagram(&mut out, &result.decoded[1]).expect("write");
    let text = String::from_utf8(out).expect("utf8");
    assert!(text.contains("Unknown (0x0300001c)"));
    assert!(text.contains("offset    0: 34 00 01 00"));
}
