//! Typed message records.
//!
//! Every message kind is one [`MessageRecord`] variant. Bodies are built from a
//! small set of shapes:
//!
//! - a plain record (sub-protocol messages with fixed fields only),
//! - [`ListMessage`]: fixed header plus a repeated block,
//! - [`Profiled`]: profile preamble plus fixed fields,
//! - [`ProfiledList`]: profile preamble, fixed header, repeated block.
//!
//! Field names follow the signal matrix; units are those of the wire (raw
//! integers, no scaling applied).

use crate::codec::record;
use crate::registry::MessageKind;
use serde::Serialize;

record! {
    /// Shared 27-byte preamble of profile messages, bytes `[44, 71)`.
    pub struct ProfileHeader {
        pub instance_id: u32,
        pub retransmit: bool,
        pub change_flag: u8,
        pub confidence: f32,
        pub path_id: u32,
        pub lane_number: u8,
        pub offset: u32,
        pub end_offset: u32,
        pub end_offset_final: bool,
        pub interpolation: u8,
        pub profile_type: u8,
        pub available: bool,
    }

    /// In-message element count preceding a repeated block.
    pub struct ItemCount {
        pub count: u8,
    }

    /// Latitude / longitude / altitude triple.
    pub struct GeoPoint {
        pub lat: i32,
        pub lon: i32,
        pub alt: i32,
    }
}

// Location (sub-protocol, fixed layout 44..179).
record! {
    pub struct RelativePosition {
        pub road_id: u64,
        pub lane_id: u64,
        pub lane_seq: u8,
        pub dis_left: u32,
        pub dis_right: u32,
        pub head_left: f32,
        pub head_right: f32,
    }

    pub struct AbsolutePosition {
        pub lon: i32,
        pub lat: i32,
        pub heading: f32,
        pub lon_std: f32,
        pub lat_std: f32,
        pub confidence: u8,
        pub acc_x: f32,
        pub acc_y: f32,
        pub acc_z: f32,
        pub angular_velocity_x: f32,
        pub angular_velocity_y: f32,
        pub angular_velocity_z: f32,
    }

    pub struct GeofenceJudgement {
        pub status: u8,
        pub judge_type: u8,
    }

    pub struct PositionInfo {
        pub timestamp: u64,
        pub position_age: u64,
        pub path_id: u32,
        pub offset: u32,
        pub accuracy: u32,
        pub deviation: i32,
        pub speed: f32,
        pub relative_heading: f32,
        pub probability: f32,
        pub current_lane: u8,
        pub prefer_path: u32,
    }

    pub struct FailSafe {
        pub loc_status: u8,
        pub gnss_status: u8,
        pub camera_status: u8,
        pub hdmap_status: u8,
        pub vehicle_status: u8,
        pub imu_status: u8,
    }

    pub struct Location {
        pub relative: RelativePosition,
        pub absolute: AbsolutePosition,
        pub geofence: GeofenceJudgement,
        pub position: PositionInfo,
        pub fail_safe: FailSafe,
    }
}

// Path and profile control.
record! {
    pub struct PathControlHeader {
        pub id_first: u32,
        pub id_last: u32,
        pub path_count: u8,
        pub is_reset: u8,
    }

    pub struct PathEntry {
        pub id: u32,
        pub parent_id: u32,
        pub offset: u32,
    }

    pub struct PathOffset {
        pub path_id: u32,
        pub offset: u32,
    }
}

// Global data (sub-protocol, fixed layout 44..95).
record! {
    /// `type / available / value` triple with a one-byte value.
    pub struct GlobalByte {
        pub data_type: u8,
        pub available: bool,
        pub value: u8,
    }

    /// `type / available / value` triple with a four-byte value.
    pub struct GlobalWord {
        pub data_type: u8,
        pub available: bool,
        pub value: u32,
    }

    pub struct GlobalData {
        pub drive_side: GlobalByte,
        pub country_code: GlobalWord,
        pub unit_system: GlobalByte,
        pub protocol_version: GlobalWord,
        pub hardware_version: GlobalWord,
        pub map_version: GlobalWord,
        pub map_age: GlobalWord,
        pub map_provider: GlobalWord,
        pub guidance: GlobalByte,
        pub simulating: bool,
        pub reserved: u8,
        pub region_code: u32,
    }
}

// Profile elements.
record! {
    pub struct NodeArm {
        pub sub_path: u32,
        pub probability: f32,
        pub turn_angle: f32,
        pub complex_intersection: bool,
        pub right_of_way: u8,
    }

    pub struct LaneEntry {
        pub lane_number: u8,
        pub direction: u8,
        pub transit: u8,
        pub lane_type: u32,
        pub lane_app_type: u32,
        pub center_line: u32,
        pub left_boundary: u32,
        pub right_boundary: u32,
    }

    pub struct LaneConnection {
        pub init_lane_number: u8,
        pub init_path: u32,
        pub new_lane_number: u8,
        pub new_path: u32,
        pub to_link_id: u32,
    }

    pub struct LinearObject {
        pub id: u32,
        pub line_type: u8,
        pub marking: u8,
        pub color: u8,
        pub bold: u8,
    }

    pub struct LaneGeometryHeader {
        pub geometry_count: u8,
        pub line_id: u32,
        pub curve_type: u8,
        pub point_count: u8,
    }

    pub struct CurvaturePoint {
        pub offset: u32,
        pub curvature: f32,
    }

    pub struct SlopePoint {
        pub offset: u32,
        pub slope: f32,
        pub cross_slope: f32,
    }

    pub struct GeoFenceZone {
        pub fence_type: u8,
        pub seq: i8,
        pub offset: u32,
        pub end_offset: u32,
    }

    pub struct MergePointEntry {
        pub path_id: u32,
        pub offset: u32,
        pub is_master: bool,
    }
}

// Profile attributes with fixed fields only.
record! {
    pub struct SpeedLimit {
        pub speed_high: u8,
        pub speed_low: u8,
        pub unit: u8,
    }

    pub struct LaneCount {
        pub lanes: u8,
    }

    pub struct LinkId {
        pub link_id: u64,
    }

    pub struct RoadClass {
        pub functional_road_class: u8,
    }

    pub struct FormOfWay {
        pub link_form_of_way: u8,
    }

    pub struct TunnelFlag {
        pub is_tunnel: bool,
    }

    pub struct LaneWidth {
        pub min_width: u16,
        pub max_width: u16,
    }

    pub struct TollgateFlag {
        pub is_tollgate: bool,
    }

    pub struct EventAnchor {
        pub offset: u32,
        pub lat: i32,
        pub lon: i32,
    }

    pub struct TrafficEvent {
        pub sub_type: u16,
        pub traffic_speed: u8,
        pub jam_level: u8,
        pub start: EventAnchor,
        pub end: EventAnchor,
    }

    pub struct Meteorology {
        pub precipitation: u32,
        pub wind_direction: u8,
        pub wind_scale: u8,
        pub weather: u8,
    }

    pub struct TrafficSignHeader {
        pub sign_type: u8,
        pub shape: u8,
    }

    pub struct PoleHeader {
        pub pole_type: u8,
    }
}

// Navigation-on-autopilot messages (sub-protocol).
record! {
    pub struct NavigationInfo {
        pub navigation_status: u8,
        pub matching_status: u8,
        pub remain_distance: u32,
    }

    pub struct LaneSwitch {
        pub direction: u8,
        pub reason: u8,
        pub distance: u16,
        pub end_distance: u16,
        pub line_count: u16,
    }

    pub struct SwitchInfoHeader {
        pub navigation: NavigationInfo,
        pub switch: LaneSwitch,
    }

    pub struct RouteListHeader {
        pub hdmap_version: u32,
        pub link_count: u16,
    }
}

/// Fixed header followed by a repeated block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListMessage<H, E> {
    pub header: H,
    pub items: Vec<E>,
}

/// Profile preamble followed by fixed fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profiled<B> {
    pub profile: ProfileHeader,
    pub body: B,
}

/// Profile preamble, fixed header, repeated block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfiledList<H, E> {
    pub profile: ProfileHeader,
    pub header: H,
    pub items: Vec<E>,
}

pub type PathControl = ListMessage<PathControlHeader, PathEntry>;
pub type ProfileControl = ListMessage<(), PathOffset>;
pub type Node = ProfiledList<ItemCount, NodeArm>;
pub type LaneModel = ProfiledList<ItemCount, LaneEntry>;
pub type LaneConnectivity = ProfiledList<ItemCount, LaneConnection>;
pub type LinearObjects = ProfiledList<ItemCount, LinearObject>;
pub type LanesGeometry = ProfiledList<LaneGeometryHeader, GeoPoint>;
pub type Curvature = ProfiledList<ItemCount, CurvaturePoint>;
pub type Slope = ProfiledList<ItemCount, SlopePoint>;
pub type RoadGeometry = ProfiledList<ItemCount, GeoPoint>;
pub type SwitchInfo = ListMessage<SwitchInfoHeader, u32>;
pub type RouteList = ListMessage<RouteListHeader, u32>;
pub type Emergency = ProfiledList<ItemCount, u32>;
pub type GeoFence = ProfiledList<ItemCount, GeoFenceZone>;
pub type MergePoint = ProfiledList<ItemCount, MergePointEntry>;
pub type TrafficSign = ProfiledList<TrafficSignHeader, GeoPoint>;
pub type Pole = ProfiledList<PoleHeader, GeoPoint>;
/// Gantry, ground arrow and ground text: bare point lists.
pub type PointList = ProfiledList<(), GeoPoint>;

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MessageRecord {
    Location(Location),
    PathControl(PathControl),
    GlobalData(GlobalData),
    ProfileControl(ProfileControl),
    Node(Node),
    LaneModel(LaneModel),
    LaneConnectivity(LaneConnectivity),
    LinearObjects(LinearObjects),
    LanesGeometry(LanesGeometry),
    Curvature(Curvature),
    Slope(Slope),
    EffectiveSpeedLimit(Profiled<SpeedLimit>),
    RoadGeometry(RoadGeometry),
    NumberOfLanesDrivingDirection(Profiled<LaneCount>),
    LinkIdentifier(Profiled<LinkId>),
    FunctionalRoadClass(Profiled<RoadClass>),
    FormOfWay(Profiled<FormOfWay>),
    Tunnel(Profiled<TunnelFlag>),
    LaneWidth(Profiled<LaneWidth>),
    SwitchInfo(SwitchInfo),
    DynamicInfoEvent(Profiled<TrafficEvent>),
    RouteList(RouteList),
    DynamicInfoMeteorology(Profiled<Meteorology>),
    DynamicInfoEmergency(Emergency),
    GeoFence(GeoFence),
    MergePoint(MergePoint),
    TrafficSign(TrafficSign),
    Gantry(PointList),
    Pole(Pole),
    GroundArrow(PointList),
    GroundText(PointList),
    Tollgate(Profiled<TollgateFlag>),
    /// Type id with no decoding strategy; the datagram is kept verbatim.
    Unknown { type_id: u32, payload: Vec<u8> },
}

impl MessageRecord {
    /// Kind of a recognised record; `None` for [`MessageRecord::Unknown`].
    pub fn kind(&self) -> Option<MessageKind> {
        use MessageKind as K;
        Some(match self {
            MessageRecord::Location(_) => K::Location,
            MessageRecord::PathControl(_) => K::PathControl,
            MessageRecord::GlobalData(_) => K::GlobalData,
            MessageRecord::ProfileControl(_) => K::ProfileControl,
            MessageRecord::Node(_) => K::Node,
            MessageRecord::LaneModel(_) => K::LaneModel,
            MessageRecord::LaneConnectivity(_) => K::LaneConnectivity,
            MessageRecord::LinearObjects(_) => K::LinearObjects,
            MessageRecord::LanesGeometry(_) => K::LanesGeometry,
            MessageRecord::Curvature(_) => K::Curvature,
            MessageRecord::Slope(_) => K::Slope,
            MessageRecord::EffectiveSpeedLimit(_) => K::EffectiveSpeedLimit,
            MessageRecord::RoadGeometry(_) => K::RoadGeometry,
            MessageRecord::NumberOfLanesDrivingDirection(_) => K::NumberOfLanesDrivingDirection,
            MessageRecord::LinkIdentifier(_) => K::LinkIdentifier,
            MessageRecord::FunctionalRoadClass(_) => K::FunctionalRoadClass,
            MessageRecord::FormOfWay(_) => K::FormOfWay,
            MessageRecord::Tunnel(_) => K::Tunnel,
            MessageRecord::LaneWidth(_) => K::LaneWidth,
            MessageRecord::SwitchInfo(_) => K::SwitchInfo,
            MessageRecord::DynamicInfoEvent(_) => K::DynamicInfoEvent,
            MessageRecord::RouteList(_) => K::RouteList,
            MessageRecord::DynamicInfoMeteorology(_) => K::DynamicInfoMeteorology,
            MessageRecord::DynamicInfoEmergency(_) => K::DynamicInfoEmergency,
            MessageRecord::GeoFence(_) => K::GeoFence,
            MessageRecord::MergePoint(_) => K::MergePoint,
            MessageRecord::TrafficSign(_) => K::TrafficSign,
            MessageRecord::Gantry(_) => K::Gantry,
            MessageRecord::Pole(_) => K::Pole,
            MessageRecord::GroundArrow(_) => K::GroundArrow,
            MessageRecord::GroundText(_) => K::GroundText,
            MessageRecord::Tollgate(_) => K::Tollgate,
            MessageRecord::Unknown { .. } => return None,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind().map(MessageKind::name).unwrap_or("Unknown")
    }

    pub fn type_id(&self) -> u32 {
        match self {
            MessageRecord::Unknown { type_id, .. } => *type_id,
            other => other.kind().map(MessageKind::type_id).unwrap_or_default(),
        }
    }

    /// Profile preamble, for the kinds that carry one.
    pub fn profile(&self) -> Option<&ProfileHeader> {
        match self {
            MessageRecord::Node(m) => Some(&m.profile),
            MessageRecord::LaneModel(m) => Some(&m.profile),
            MessageRecord::LaneConnectivity(m) => Some(&m.profile),
            MessageRecord::LinearObjects(m) => Some(&m.profile),
            MessageRecord::LanesGeometry(m) => Some(&m.profile),
            MessageRecord::Curvature(m) => Some(&m.profile),
            MessageRecord::Slope(m) => Some(&m.profile),
            MessageRecord::EffectiveSpeedLimit(m) => Some(&m.profile),
            MessageRecord::RoadGeometry(m) => Some(&m.profile),
            MessageRecord::NumberOfLanesDrivingDirection(m) => Some(&m.profile),
            MessageRecord::LinkIdentifier(m) => Some(&m.profile),
            MessageRecord::FunctionalRoadClass(m) => Some(&m.profile),
            MessageRecord::FormOfWay(m) => Some(&m.profile),
            MessageRecord::Tunnel(m) => Some(&m.profile),
            MessageRecord::LaneWidth(m) => Some(&m.profile),
            MessageRecord::DynamicInfoEvent(m) => Some(&m.profile),
            MessageRecord::DynamicInfoMeteorology(m) => Some(&m.profile),
            MessageRecord::DynamicInfoEmergency(m) => Some(&m.profile),
            MessageRecord::GeoFence(m) => Some(&m.profile),
            MessageRecord::MergePoint(m) => Some(&m.profile),
            MessageRecord::TrafficSign(m) => Some(&m.profile),
            MessageRecord::Gantry(m) => Some(&m.profile),
            MessageRecord::Pole(m) => Some(&m.profile),
            MessageRecord::GroundArrow(m) => Some(&m.profile),
            MessageRecord::GroundText(m) => Some(&m.profile),
            MessageRecord::Tollgate(m) => Some(&m.profile),
            _ => None,
        }
    }

    /// Length of the repeated block, for kinds that have one.
    pub fn item_count(&self) -> Option<usize> {
        Some(match self {
            MessageRecord::PathControl(m) => m.items.len(),
            MessageRecord::ProfileControl(m) => m.items.len(),
            MessageRecord::SwitchInfo(m) => m.items.len(),
            MessageRecord::RouteList(m) => m.items.len(),
            MessageRecord::Node(m) => m.items.len(),
            MessageRecord::LaneModel(m) => m.items.len(),
            MessageRecord::LaneConnectivity(m) => m.items.len(),
            MessageRecord::LinearObjects(m) => m.items.len(),
            MessageRecord::LanesGeometry(m) => m.items.len(),
            MessageRecord::Curvature(m) => m.items.len(),
            MessageRecord::Slope(m) => m.items.len(),
            MessageRecord::RoadGeometry(m) => m.items.len(),
            MessageRecord::DynamicInfoEmergency(m) => m.items.len(),
            MessageRecord::GeoFence(m) => m.items.len(),
            MessageRecord::MergePoint(m) => m.items.len(),
            MessageRecord::TrafficSign(m) => m.items.len(),
            MessageRecord::Pole(m) => m.items.len(),
            MessageRecord::Gantry(m) | MessageRecord::GroundArrow(m) | MessageRecord::GroundText(m) => {
                m.items.len()
            }
            _ => return None,
        })
    }

    /// Identifier list carried by the record, if it is one that gets split over datagrams.
    pub fn id_sequence(&self) -> Option<&[u32]> {
        match self {
            MessageRecord::RouteList(m) => Some(&m.items),
            MessageRecord::SwitchInfo(m) => Some(&m.items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Record;

    #[test]
    fn fixed_widths_match_wire_spans() {
        assert_eq!(ProfileHeader::WIDTH, 27);
        assert_eq!(Location::WIDTH, 179 - 44);
        assert_eq!(RelativePosition::WIDTH, 33);
        assert_eq!(AbsolutePosition::WIDTH, 45);
        assert_eq!(PositionInfo::WIDTH, 49);
        assert_eq!(GlobalData::WIDTH, 95 - 44);
        assert_eq!(PathControlHeader::WIDTH, 10);
        assert_eq!(SwitchInfoHeader::WIDTH, 14);
        assert_eq!(RouteListHeader::WIDTH, 6);
        assert_eq!(LaneGeometryHeader::WIDTH, 7);
        assert_eq!(TrafficEvent::WIDTH, 99 - 71);
        assert_eq!(Meteorology::WIDTH, 7);
    }

    #[test]
    fn element_widths_match_wire_spans() {
        assert_eq!(NodeArm::WIDTH, 14);
        assert_eq!(LaneEntry::WIDTH, 23);
        assert_eq!(LaneConnection::WIDTH, 14);
        assert_eq!(LinearObject::WIDTH, 8);
        assert_eq!(CurvaturePoint::WIDTH, 8);
        assert_eq!(SlopePoint::WIDTH, 12);
        assert_eq!(GeoPoint::WIDTH, 12);
        assert_eq!(GeoFenceZone::WIDTH, 10);
        assert_eq!(MergePointEntry::WIDTH, 9);
        assert_eq!(PathEntry::WIDTH, 12);
        assert_eq!(PathOffset::WIDTH, 8);
    }
}
