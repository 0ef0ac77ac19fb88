//! Message variant registry: type id → decoding strategy.
//!
//! [`STRATEGIES`] is the whole protocol in one table. Each row pairs a
//! [`MessageKind`] with its [`Layout`] (derived from the record types) and the
//! [`MessageRecord`] variant it produces; [`decode_message`] runs the row
//! through the layout engine. Type ids with no row decode to
//! [`MessageRecord::Unknown`].

use crate::codec::{DecodeError, DecodeWarning, Record};
use crate::frame::{parse_header, ENVELOPE_LEN};
use crate::layout::{decode_layout, CountRule, Decoded, Layout, Preamble, RepeatedBlock};
use crate::record::*;
use serde::Serialize;
use std::fmt;

/// Message kinds of the signal matrix; the discriminant is the wire type id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(u32)]
pub enum MessageKind {
    Location = 0x0300_0001,
    PathControl = 0x0300_0002,
    GlobalData = 0x0300_0003,
    ProfileControl = 0x0300_0004,
    Node = 0x0300_0005,
    LaneModel = 0x0300_0006,
    LaneConnectivity = 0x0300_0007,
    LinearObjects = 0x0300_0008,
    LanesGeometry = 0x0300_0009,
    Curvature = 0x0300_000A,
    Slope = 0x0300_000B,
    EffectiveSpeedLimit = 0x0300_000C,
    RoadGeometry = 0x0300_000D,
    NumberOfLanesDrivingDirection = 0x0300_000E,
    LinkIdentifier = 0x0300_000F,
    FunctionalRoadClass = 0x0300_0010,
    FormOfWay = 0x0300_0011,
    Tunnel = 0x0300_0012,
    LaneWidth = 0x0300_0013,
    SwitchInfo = 0x0300_0014,
    DynamicInfoEvent = 0x0300_0015,
    RouteList = 0x0300_0017,
    DynamicInfoMeteorology = 0x0300_0018,
    DynamicInfoEmergency = 0x0300_0019,
    GeoFence = 0x0300_001A,
    MergePoint = 0x0300_001B,
    TrafficSign = 0x0300_001D,
    Gantry = 0x0300_001E,
    Pole = 0x0300_001F,
    GroundArrow = 0x0300_0020,
    GroundText = 0x0300_0021,
    Tollgate = 0x0300_0022,
}

impl MessageKind {
    pub const fn type_id(self) -> u32 {
        self as u32
    }

    pub fn from_type_id(type_id: u32) -> Option<Self> {
        strategy(type_id).map(|s| s.kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            MessageKind::Location => "Location",
            MessageKind::PathControl => "PathControl",
            MessageKind::GlobalData => "GlobalData",
            MessageKind::ProfileControl => "ProfileControl",
            MessageKind::Node => "Node",
            MessageKind::LaneModel => "LaneModel",
            MessageKind::LaneConnectivity => "LaneConnectivity",
            MessageKind::LinearObjects => "LinearObjects",
            MessageKind::LanesGeometry => "LanesGeometry",
            MessageKind::Curvature => "Curvature",
            MessageKind::Slope => "Slope",
            MessageKind::EffectiveSpeedLimit => "EffectiveSpeedLimit",
            MessageKind::RoadGeometry => "RoadGeometry",
            MessageKind::NumberOfLanesDrivingDirection => "NumberOfLanesDrivingDirection",
            MessageKind::LinkIdentifier => "LinkIdentifier",
            MessageKind::FunctionalRoadClass => "FunctionalRoadClass",
            MessageKind::FormOfWay => "FormOfWay",
            MessageKind::Tunnel => "Tunnel",
            MessageKind::LaneWidth => "LaneWidth",
            MessageKind::SwitchInfo => "SwitchInfo",
            MessageKind::DynamicInfoEvent => "DynamicInfoEvent",
            MessageKind::RouteList => "RouteList",
            MessageKind::DynamicInfoMeteorology => "DynamicInfoMeteorology",
            MessageKind::DynamicInfoEmergency => "DynamicInfoEmergency",
            MessageKind::GeoFence => "GeoFence",
            MessageKind::MergePoint => "MergePoint",
            MessageKind::TrafficSign => "TrafficSign",
            MessageKind::Gantry => "Gantry",
            MessageKind::Pole => "Pole",
            MessageKind::GroundArrow => "GroundArrow",
            MessageKind::GroundText => "GroundText",
            MessageKind::Tollgate => "Tollgate",
        }
    }

    /// Layout used to decode this kind.
    pub fn layout(self) -> Option<&'static Layout> {
        strategy(self.type_id()).map(|s| &s.layout)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.type_id())
    }
}

type Build = fn(Decoded) -> Result<MessageRecord, DecodeError>;

/// One row of the registry.
pub struct Strategy {
    pub kind: MessageKind,
    pub layout: Layout,
    build: Build,
}

impl Strategy {
    const fn plain<B: Record>(kind: MessageKind, build: Build) -> Self {
        Strategy {
            kind,
            layout: Layout {
                preamble: Preamble::SubProtocol,
                fixed: B::LAYOUT,
                repeated: None,
            },
            build,
        }
    }

    const fn list<H: Record, E: Record>(kind: MessageKind, count: CountRule, build: Build) -> Self {
        Strategy {
            kind,
            layout: Layout {
                preamble: Preamble::SubProtocol,
                fixed: H::LAYOUT,
                repeated: Some(RepeatedBlock {
                    element: E::LAYOUT,
                    count,
                }),
            },
            build,
        }
    }

    const fn profiled<B: Record>(kind: MessageKind, build: Build) -> Self {
        Strategy {
            kind,
            layout: Layout {
                preamble: Preamble::Profile,
                fixed: B::LAYOUT,
                repeated: None,
            },
            build,
        }
    }

    const fn profiled_list<H: Record, E: Record>(kind: MessageKind, count: CountRule, build: Build) -> Self {
        Strategy {
            kind,
            layout: Layout {
                preamble: Preamble::Profile,
                fixed: H::LAYOUT,
                repeated: Some(RepeatedBlock {
                    element: E::LAYOUT,
                    count,
                }),
            },
            build,
        }
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("kind", &self.kind)
            .field("layout", &self.layout)
            .finish()
    }
}

use crate::layout::CountRule::{Explicit, ExplicitAligned, Fixed, FromLength};
use crate::record::MessageRecord as R;
use self::MessageKind as K;

/// The registry, ordered by type id.
pub static STRATEGIES: [Strategy; 32] = [
    Strategy::plain::<Location>(K::Location, |d| Ok(R::Location(d.plain()?))),
    Strategy::list::<PathControlHeader, PathEntry>(K::PathControl, FromLength, |d| {
        Ok(R::PathControl(d.list()?))
    }),
    Strategy::plain::<GlobalData>(K::GlobalData, |d| Ok(R::GlobalData(d.plain()?))),
    Strategy::list::<(), PathOffset>(K::ProfileControl, FromLength, |d| {
        Ok(R::ProfileControl(d.list()?))
    }),
    Strategy::profiled_list::<ItemCount, NodeArm>(K::Node, FromLength, |d| {
        Ok(R::Node(d.profiled_list()?))
    }),
    Strategy::profiled_list::<ItemCount, LaneEntry>(K::LaneModel, FromLength, |d| {
        Ok(R::LaneModel(d.profiled_list()?))
    }),
    Strategy::profiled_list::<ItemCount, LaneConnection>(K::LaneConnectivity, Explicit, |d| {
        Ok(R::LaneConnectivity(d.profiled_list()?))
    }),
    Strategy::profiled_list::<ItemCount, LinearObject>(K::LinearObjects, FromLength, |d| {
        Ok(R::LinearObjects(d.profiled_list()?))
    }),
    Strategy::profiled_list::<LaneGeometryHeader, GeoPoint>(K::LanesGeometry, FromLength, |d| {
        Ok(R::LanesGeometry(d.profiled_list()?))
    }),
    Strategy::profiled_list::<ItemCount, CurvaturePoint>(K::Curvature, ExplicitAligned, |d| {
        Ok(R::Curvature(d.profiled_list()?))
    }),
    Strategy::profiled_list::<ItemCount, SlopePoint>(K::Slope, FromLength, |d| {
        Ok(R::Slope(d.profiled_list()?))
    }),
    Strategy::profiled::<SpeedLimit>(K::EffectiveSpeedLimit, |d| {
        Ok(R::EffectiveSpeedLimit(d.profiled()?))
    }),
    Strategy::profiled_list::<ItemCount, GeoPoint>(K::RoadGeometry, FromLength, |d| {
        Ok(R::RoadGeometry(d.profiled_list()?))
    }),
    Strategy::profiled::<LaneCount>(K::NumberOfLanesDrivingDirection, |d| {
        Ok(R::NumberOfLanesDrivingDirection(d.profiled()?))
    }),
    Strategy::profiled::<LinkId>(K::LinkIdentifier, |d| Ok(R::LinkIdentifier(d.profiled()?))),
    Strategy::profiled::<RoadClass>(K::FunctionalRoadClass, |d| {
        Ok(R::FunctionalRoadClass(d.profiled()?))
    }),
    Strategy::profiled::<FormOfWay>(K::FormOfWay, |d| Ok(R::FormOfWay(d.profiled()?))),
    Strategy::profiled::<TunnelFlag>(K::Tunnel, |d| Ok(R::Tunnel(d.profiled()?))),
    Strategy::profiled::<LaneWidth>(K::LaneWidth, |d| Ok(R::LaneWidth(d.profiled()?))),
    Strategy::list::<SwitchInfoHeader, u32>(K::SwitchInfo, Explicit, |d| {
        Ok(R::SwitchInfo(d.list()?))
    }),
    Strategy::profiled::<TrafficEvent>(K::DynamicInfoEvent, |d| {
        Ok(R::DynamicInfoEvent(d.profiled()?))
    }),
    Strategy::list::<RouteListHeader, u32>(K::RouteList, Explicit, |d| Ok(R::RouteList(d.list()?))),
    Strategy::profiled::<Meteorology>(K::DynamicInfoMeteorology, |d| {
        Ok(R::DynamicInfoMeteorology(d.profiled()?))
    }),
    Strategy::profiled_list::<ItemCount, u32>(K::DynamicInfoEmergency, Explicit, |d| {
        Ok(R::DynamicInfoEmergency(d.profiled_list()?))
    }),
    Strategy::profiled_list::<ItemCount, GeoFenceZone>(K::GeoFence, Explicit, |d| {
        Ok(R::GeoFence(d.profiled_list()?))
    }),
    Strategy::profiled_list::<ItemCount, MergePointEntry>(K::MergePoint, FromLength, |d| {
        Ok(R::MergePoint(d.profiled_list()?))
    }),
    // Centre position plus eight bounding-box corners.
    Strategy::profiled_list::<TrafficSignHeader, GeoPoint>(K::TrafficSign, Fixed(9), |d| {
        Ok(R::TrafficSign(d.profiled_list()?))
    }),
    Strategy::profiled_list::<(), GeoPoint>(K::Gantry, FromLength, |d| Ok(R::Gantry(d.profiled_list()?))),
    Strategy::profiled_list::<PoleHeader, GeoPoint>(K::Pole, Fixed(9), |d| Ok(R::Pole(d.profiled_list()?))),
    Strategy::profiled_list::<(), GeoPoint>(K::GroundArrow, FromLength, |d| {
        Ok(R::GroundArrow(d.profiled_list()?))
    }),
    Strategy::profiled_list::<(), GeoPoint>(K::GroundText, FromLength, |d| {
        Ok(R::GroundText(d.profiled_list()?))
    }),
    Strategy::profiled::<TollgateFlag>(K::Tollgate, |d| Ok(R::Tollgate(d.profiled()?))),
];

/// Row for `type_id`, if the kind is known.
pub fn strategy(type_id: u32) -> Option<&'static Strategy> {
    STRATEGIES
        .binary_search_by_key(&type_id, |s| s.kind.type_id())
        .ok()
        .map(|i| &STRATEGIES[i])
}

/// Decode one datagram into its record.
///
/// Buffers shorter than the 44-byte envelope fail with
/// [`DecodeError::TruncatedBuffer`] whatever their type id.
pub fn decode_message(buffer: &[u8]) -> Result<MessageRecord, DecodeError> {
    decode_message_with_warnings(buffer).map(|(record, _)| record)
}

/// Decode one datagram and return the non-fatal findings alongside the record.
pub fn decode_message_with_warnings(
    buffer: &[u8],
) -> Result<(MessageRecord, Vec<DecodeWarning>), DecodeError> {
    if buffer.len() < ENVELOPE_LEN {
        return Err(DecodeError::TruncatedBuffer {
            offset: 0,
            needed: ENVELOPE_LEN,
            available: buffer.len(),
        });
    }
    let header = parse_header(buffer)?;
    let Some(strategy) = strategy(header.message_type_id) else {
        tracing::debug!("unknown message type {:#010x}", header.message_type_id);
        return Ok((
            MessageRecord::Unknown {
                type_id: header.message_type_id,
                payload: buffer.to_vec(),
            },
            Vec::new(),
        ));
    };
    if header.declared_total() != buffer.len() {
        tracing::debug!(
            kind = %strategy.kind,
            declared = header.declared_total(),
            actual = buffer.len(),
            "declared length disagrees with datagram length"
        );
    }
    let mut warnings = Vec::new();
    let decoded = decode_layout(buffer, &header, strategy.kind, &strategy.layout, &mut warnings)?;
    let record = (strategy.build)(decoded)?;
    Ok((record, warnings))
}
