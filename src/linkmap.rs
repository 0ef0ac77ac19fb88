//! Per-link attribute map built from profile messages.
//!
//! Keys are profile instance ids. Only the attributes a downstream map
//! consumer needs are kept: form of way and functional road class.
//!
//! Two JSON shapes are written. [`LinkMap::write_json`] keeps every attribute
//! (`{"17": {"form_of_way": 2, "functional_road_class": 4}}`) and is what
//! [`LinkMap::read_json`] reads back. [`LinkMap::write_flat_json`] writes only
//! the form of way (`{"17": 2}`) for consumers of the older flat format.

use crate::record::MessageRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_of_way: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functional_road_class: Option<u8>,
}

impl LinkAttributes {
    /// Fields set in `other` replace ours.
    fn overlay(&mut self, other: LinkAttributes) {
        if other.form_of_way.is_some() {
            self.form_of_way = other.form_of_way;
        }
        if other.functional_road_class.is_some() {
            self.functional_road_class = other.functional_road_class;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkMap {
    links: BTreeMap<u32, LinkAttributes>,
}

impl LinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the attribute carried by `record`, if any. Later observations win.
    pub fn observe(&mut self, record: &MessageRecord) -> bool {
        let (instance_id, attrs) = match record {
            MessageRecord::FormOfWay(m) => (
                m.profile.instance_id,
                LinkAttributes {
                    form_of_way: Some(m.body.link_form_of_way),
                    ..Default::default()
                },
            ),
            MessageRecord::FunctionalRoadClass(m) => (
                m.profile.instance_id,
                LinkAttributes {
                    functional_road_class: Some(m.body.functional_road_class),
                    ..Default::default()
                },
            ),
            _ => return false,
        };
        self.links.entry(instance_id).or_default().overlay(attrs);
        true
    }

    /// Merge `other` into `self`; entries from `other` win.
    pub fn merge(&mut self, other: LinkMap) {
        for (id, attrs) in other.links {
            self.links.entry(id).or_default().overlay(attrs);
        }
    }

    pub fn get(&self, instance_id: u32) -> Option<&LinkAttributes> {
        self.links.get(&instance_id)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &LinkAttributes)> {
        self.links.iter().map(|(id, a)| (*id, a))
    }

    /// Form of way per link; links without one are left out.
    pub fn form_of_way_table(&self) -> BTreeMap<u32, u8> {
        self.links
            .iter()
            .filter_map(|(id, a)| a.form_of_way.map(|fow| (*id, fow)))
            .collect()
    }

    pub fn write_flat_json<W: Write>(&self, w: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(w, &self.form_of_way_table())
    }

    pub fn write_json<W: Write>(&self, w: W) -> serde_json::Result<()> {
        serde_json::to_writer_pretty(w, self)
    }

    pub fn read_json<R: Read>(r: R) -> serde_json::Result<Self> {
        serde_json::from_reader(r)
    }
}

impl<'a> Extend<&'a MessageRecord> for LinkMap {
    fn extend<I: IntoIterator<Item = &'a MessageRecord>>(&mut self, iter: I) {
        for record in iter {
            self.observe(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FormOfWay, ProfileHeader, Profiled, RoadClass};

    fn profile(instance_id: u32) -> ProfileHeader {
        ProfileHeader {
            instance_id,
            retransmit: false,
            change_flag: 0,
            confidence: 1.0,
            path_id: 8,
            lane_number: 0,
            offset: 0,
            end_offset: 100,
            end_offset_final: true,
            interpolation: 0,
            profile_type: 0,
            available: true,
        }
    }

    fn form_of_way(id: u32, fow: u8) -> MessageRecord {
        MessageRecord::FormOfWay(Profiled {
            profile: profile(id),
            body: FormOfWay { link_form_of_way: fow },
        })
    }

    #[test]
    fn later_observation_wins() {
        let mut map = LinkMap::new();
        assert!(map.observe(&form_of_way(7, 1)));
        assert!(map.observe(&form_of_way(7, 4)));
        assert!(map.observe(&MessageRecord::FunctionalRoadClass(Profiled {
            profile: profile(7),
            body: RoadClass { functional_road_class: 2 },
        })));
        assert!(!map.observe(&MessageRecord::Unknown { type_id: 1, payload: vec![] }));
        assert_eq!(
            map.get(7),
            Some(&LinkAttributes {
                form_of_way: Some(4),
                functional_road_class: Some(2)
            })
        );
    }

    #[test]
    fn json_round_trip_keeps_ids() {
        let mut map = LinkMap::new();
        map.extend([&form_of_way(3, 10), &form_of_way(11, 2)]);
        let mut out = Vec::new();
        map.write_json(&mut out).expect("write");
        let text = String::from_utf8(out.clone()).expect("utf8");
        assert!(text.contains("\"11\""));
        assert!(!text.contains("functional_road_class"));
        let back = LinkMap::read_json(out.as_slice()).expect("read");
        assert_eq!(back, map);
    }

    #[test]
    fn flat_json_maps_link_to_form_of_way() {
        let mut map = LinkMap::new();
        map.extend([&form_of_way(3, 10), &form_of_way(11, 2)]);
        map.observe(&MessageRecord::FunctionalRoadClass(Profiled {
            profile: profile(20),
            body: RoadClass { functional_road_class: 5 },
        }));
        let mut out = Vec::new();
        map.write_flat_json(&mut out).expect("write");
        let value: serde_json::Value = serde_json::from_slice(&out).expect("json");
        assert_eq!(value, serde_json::json!({"3": 10, "11": 2}));
    }

    #[test]
    fn merge_prefers_other() {
        let mut a = LinkMap::new();
        a.observe(&form_of_way(1, 1));
        a.observe(&form_of_way(2, 1));
        let mut b = LinkMap::new();
        b.observe(&form_of_way(2, 9));
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get(2).and_then(|x| x.form_of_way), Some(9));
    }
}
