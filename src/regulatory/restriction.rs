//! Restriction records and the rules that turn them into OSM tags.

use std::collections::BTreeSet;

use geo_types::LineString;
use tracing::warn;

use super::parse::{TimeOfDay, normalize_decimal};
use super::signs::{RestrSign, SignCategory, is_keyable};
use super::{Direction, Keyed, LayerKind, SegmentRecord};
use crate::error::{GeometryError, RewriteResult, SchemaError};
use crate::osm::Tags;

const DAYS_OF_WEEK: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictionType {
    HgvBan,
    HgvTrailer,
    Hazmat,
    Weight,
    AxleLoad,
    Width,
    Height,
    Length,
    HazmatWater,
}

impl RestrictionType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "253" => Some(RestrictionType::HgvBan),
            "257-57" => Some(RestrictionType::HgvTrailer),
            "261" => Some(RestrictionType::Hazmat),
            "262" => Some(RestrictionType::Weight),
            "263" => Some(RestrictionType::AxleLoad),
            "264" => Some(RestrictionType::Width),
            "265" => Some(RestrictionType::Height),
            "266" => Some(RestrictionType::Length),
            "269" => Some(RestrictionType::HazmatWater),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RestrictionType::HgvBan => "253",
            RestrictionType::HgvTrailer => "257-57",
            RestrictionType::Hazmat => "261",
            RestrictionType::Weight => "262",
            RestrictionType::AxleLoad => "263",
            RestrictionType::Width => "264",
            RestrictionType::Height => "265",
            RestrictionType::Length => "266",
            RestrictionType::HazmatWater => "269",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            RestrictionType::HgvBan => "hgv",
            RestrictionType::HgvTrailer => "hgv:trailer",
            RestrictionType::Hazmat => "hazmat",
            RestrictionType::Weight => "maxweight",
            RestrictionType::AxleLoad => "maxaxleload",
            RestrictionType::Width => "maxwidth",
            RestrictionType::Height => "maxheight",
            RestrictionType::Length => "maxlength",
            RestrictionType::HazmatWater => "hazmat:water",
        }
    }

    /// Types whose value is a measurement rather than a ban.
    pub fn is_dimensional(&self) -> bool {
        matches!(
            self,
            RestrictionType::Weight
                | RestrictionType::AxleLoad
                | RestrictionType::Width
                | RestrictionType::Height
                | RestrictionType::Length
        )
    }

    /// Value that lifts the restriction for an exempted mode.
    pub fn permissive_value(&self) -> &'static str {
        if self.is_dimensional() { "none" } else { "yes" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupedDays {
    None,
    Daily,
    Weekdays,
    SundaysHolidays,
}

impl GroupedDays {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(GroupedDays::None),
            "1" => Some(GroupedDays::Daily),
            "2" => Some(GroupedDays::Weekdays),
            "3" => Some(GroupedDays::SundaysHolidays),
            _ => None,
        }
    }

    fn render(&self) -> &'static str {
        match self {
            GroupedDays::None | GroupedDays::Daily => "",
            GroupedDays::Weekdays => "(Mo-Fr)",
            GroupedDays::SundaysHolidays => "(Su,PH)",
        }
    }
}

/// Single weekday flags, bit 0 is Monday.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Weekdays(u8);

impl Weekdays {
    const ALL: u8 = 0b111_1111;

    /// Parse a 7 character `0`/`1` mask starting on Monday.
    pub fn from_mask(mask: &str) -> Option<Self> {
        if mask.len() != 7 {
            return None;
        }
        let mut bits = 0u8;
        for (i, c) in mask.chars().enumerate() {
            match c {
                '1' => bits |= 1 << i,
                '0' => {}
                _ => return None,
            }
        }
        Some(Weekdays(bits))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Active days as `Mo, Tu`. A mask with every day set carries no information.
    fn render(&self) -> String {
        if self.0 == Self::ALL {
            return String::new();
        }
        DAYS_OF_WEEK
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, day)| *day)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// One time-of-day window; both ends or neither should be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: Option<TimeOfDay>,
    pub to: Option<TimeOfDay>,
}

/// Administrative area a record was published for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminArea {
    pub municipality: Option<String>,
    pub district: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RestrictionRecord {
    pub segment_id: i64,
    pub restriction_id: i64,
    pub name: Option<String>,
    pub osm_id: i64,
    pub osm_version: Option<i64>,
    pub direction: Direction,
    pub restriction_type: RestrictionType,
    pub value: Option<String>,
    pub weekdays: Weekdays,
    pub grouped_days: GroupedDays,
    pub windows: [TimeWindow; 2],
    pub admin: AdminArea,
    /// Active additional signs, iterated in canonical order.
    pub signs: BTreeSet<RestrSign>,
    pub geometry: LineString<f64>,
}

/// Frequent type and sign combinations with hand-written tagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommonSignature {
    HgvBanDestinationOnly,
    HgvBanDeliveryOnly,
    HgvBanDeliveryOnly7_5t,
    HgvBan7_5t,
    HgvBanDestinationOnly7_5t,
    HgvBan12t,
    MaxweightDeliveryOnly,
    HgvBanDestinationDelivery,
}

const COMMON_SIGNATURES: [(RestrictionType, &[RestrSign], CommonSignature); 8] = [
    (
        RestrictionType::HgvBan,
        &[RestrSign::Vz1020_30],
        CommonSignature::HgvBanDestinationOnly,
    ),
    (
        RestrictionType::HgvBan,
        &[RestrSign::Vz1026_35],
        CommonSignature::HgvBanDeliveryOnly,
    ),
    (
        RestrictionType::HgvBan,
        &[RestrSign::Vz1026_35, RestrSign::Vz1053_33],
        CommonSignature::HgvBanDeliveryOnly7_5t,
    ),
    (
        RestrictionType::HgvBan,
        &[RestrSign::Vz1053_33],
        CommonSignature::HgvBan7_5t,
    ),
    (
        RestrictionType::HgvBan,
        &[RestrSign::Vz1020_30, RestrSign::Vz1053_33],
        CommonSignature::HgvBanDestinationOnly7_5t,
    ),
    (
        RestrictionType::HgvBan,
        &[RestrSign::Vz1053_37],
        CommonSignature::HgvBan12t,
    ),
    (
        RestrictionType::Weight,
        &[RestrSign::Vz1026_35],
        CommonSignature::MaxweightDeliveryOnly,
    ),
    (
        RestrictionType::HgvBan,
        &[RestrSign::Vz1020_30, RestrSign::Vz1026_35],
        CommonSignature::HgvBanDestinationDelivery,
    ),
];

impl CommonSignature {
    /// Signatures that are common but still tagged by the generic rules.
    fn has_dedicated_rule(&self) -> bool {
        !matches!(
            self,
            CommonSignature::MaxweightDeliveryOnly | CommonSignature::HgvBanDestinationDelivery
        )
    }
}

/// Which rule produces the tags of a restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCase {
    Common(CommonSignature),
    ExemptAndSpecify,
    Exempt,
    Specify,
    Basic,
    /// Sign combination that is not modelled; only the basic tag is emitted.
    Fallback,
}

impl RestrictionRecord {
    fn signs_in(&self, category: SignCategory) -> impl Iterator<Item = RestrSign> + '_ {
        self.signs
            .iter()
            .copied()
            .filter(move |sign| sign.category() == category)
    }

    fn modes_of(&self, category: SignCategory) -> Vec<&'static str> {
        let mut modes: Vec<&'static str> = Vec::new();
        for sign in self.signs_in(category) {
            for mode in sign.traffic_modes() {
                if !modes.contains(mode) {
                    modes.push(mode);
                }
            }
        }
        modes
    }

    /// Type code followed by one `0`/`1` flag per additional sign.
    pub fn signature(&self) -> String {
        let mut signature = self.restriction_type.code().to_string();
        for sign in RestrSign::ALL {
            signature.push(if self.signs.contains(&sign) { '1' } else { '0' });
        }
        signature
    }

    pub fn common_signature(&self) -> Option<CommonSignature> {
        COMMON_SIGNATURES
            .iter()
            .find(|(restriction_type, signs, _)| {
                *restriction_type == self.restriction_type
                    && signs.len() == self.signs.len()
                    && signs.iter().all(|sign| self.signs.contains(sign))
            })
            .map(|(_, _, signature)| *signature)
    }

    pub fn classify(&self) -> RuleCase {
        if let Some(signature) = self.common_signature()
            && signature.has_dedicated_rule()
        {
            return RuleCase::Common(signature);
        }
        let exemptors = self.signs_in(SignCategory::Exemptor).count();
        let specifiers = self.signs_in(SignCategory::Specifier).count();
        let specials = self.signs_in(SignCategory::Special).count();
        match (exemptors > 0, specifiers > 0, specials > 0) {
            (true, true, false) => RuleCase::ExemptAndSpecify,
            (true, false, false) => RuleCase::Exempt,
            (false, true, false) => RuleCase::Specify,
            (false, false, false) => RuleCase::Basic,
            _ => RuleCase::Fallback,
        }
    }

    /// Opening-hours style condition, empty when the restriction always applies.
    pub fn time_expression(&self) -> RewriteResult<String> {
        let has_single_days = !self.weekdays.is_empty();
        let has_grouped_days = self.grouped_days != GroupedDays::None;
        if has_single_days && has_grouped_days {
            return Err(GeometryError::ConflictingDays {
                record: self.segment_id,
            }
            .into());
        }

        let days = if has_single_days {
            self.weekdays.render()
        } else {
            self.grouped_days.render().to_string()
        };

        let mut windows = Vec::new();
        for window in &self.windows {
            match (window.from, window.to) {
                (Some(from), Some(to)) => windows.push(format!("{from}-{to}")),
                (None, None) => {}
                _ => {
                    return Err(GeometryError::UnpairedTimeWindow {
                        record: self.segment_id,
                    }
                    .into());
                }
            }
        }
        let times = windows.join(",");

        Ok(match (days.is_empty(), times.is_empty()) {
            (_, true) => days,
            (true, false) => times,
            (false, false) => format!("{days} {times}"),
        })
    }

    /// Restrictive value: the measurement for dimensional types, `no` otherwise.
    fn restrictive_value(&self) -> Result<String, SchemaError> {
        if !self.restriction_type.is_dimensional() {
            return Ok("no".to_string());
        }
        let raw = self
            .value
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| SchemaError::new("wert", "", self.segment_id))?;
        normalize_decimal(raw).ok_or_else(|| SchemaError::new("wert", raw, self.segment_id))
    }

    fn basic_tag(&self, time: &str, tags: &mut Tags) -> Result<(), SchemaError> {
        let mut key = format!(
            "{}{}",
            self.restriction_type.key(),
            self.direction.suffix()
        );
        let mut value = self.restrictive_value()?;
        if !time.is_empty() {
            key.push_str(":conditional");
            value = format!("{value} @ {time}");
        }
        tags.insert(key, value);
        Ok(())
    }

    fn exemptor_tags(&self, time: &str, tags: &mut Tags) {
        let key = self.restriction_type.key();
        let dir = self.direction.suffix();
        let permissive = self.restriction_type.permissive_value();
        let hgv_ban = self.restriction_type == RestrictionType::HgvBan;
        let modes = self.modes_of(SignCategory::Exemptor);

        if !time.is_empty() {
            // Differently timed conditions cannot share one :conditional value.
            for mode in modes {
                let mode_key = if hgv_ban && is_keyable(mode) {
                    format!("{mode}{dir}")
                } else {
                    format!("{key}:{mode}{dir}")
                };
                tags.insert(mode_key, permissive.to_string());
            }
            return;
        }

        let mut rules = Vec::new();
        for mode in modes {
            if hgv_ban && is_keyable(mode) {
                tags.insert(format!("{mode}{dir}"), permissive.to_string());
            } else {
                rules.push(format!("{permissive} @ {mode}"));
            }
        }
        if !rules.is_empty() {
            tags.insert(format!("{key}{dir}:conditional"), rules.join(";"));
        }
    }

    fn specifier_tags(&self, time: &str, tags: &mut Tags) -> Result<(), SchemaError> {
        let key = self.restriction_type.key();
        let dir = self.direction.suffix();
        let hgv_ban = self.restriction_type == RestrictionType::HgvBan;
        let mut value = self.restrictive_value()?;
        if !time.is_empty() {
            value = format!("{value} @ {time}");
        }

        for mode in self.modes_of(SignCategory::Specifier) {
            let mut mode_key = if hgv_ban {
                format!("{mode}{dir}")
            } else {
                format!("{key}:{mode}{dir}")
            };
            if !time.is_empty() {
                mode_key.push_str(":conditional");
            }
            tags.insert(mode_key, value.clone());
        }
        Ok(())
    }

    fn common_signature_tags(&self, signature: CommonSignature, time: &str, tags: &mut Tags) {
        let dir = self.direction.suffix();
        match signature {
            CommonSignature::HgvBanDestinationOnly | CommonSignature::HgvBanDeliveryOnly => {
                let allowed = if signature == CommonSignature::HgvBanDestinationOnly {
                    "destination"
                } else {
                    "delivery"
                };
                if time.is_empty() {
                    tags.insert(format!("hgv{dir}"), allowed.to_string());
                } else {
                    tags.insert(
                        format!("hgv{dir}:conditional"),
                        format!("no @ {time};yes @ {allowed}"),
                    );
                }
            }
            CommonSignature::HgvBanDeliveryOnly7_5t | CommonSignature::HgvBanDestinationOnly7_5t => {
                let allowed = if signature == CommonSignature::HgvBanDeliveryOnly7_5t {
                    "delivery"
                } else {
                    "destination"
                };
                if time.is_empty() {
                    tags.insert(format!("maxweight{dir}"), "7.5".to_string());
                    tags.insert(
                        format!("maxweight{dir}:conditional"),
                        format!("none @ {allowed}"),
                    );
                } else {
                    tags.insert(
                        format!("maxweight:hgv{dir}:conditional"),
                        format!("7.5 @ {time};none @ {allowed}"),
                    );
                }
            }
            CommonSignature::HgvBan7_5t | CommonSignature::HgvBan12t => {
                let limit = if signature == CommonSignature::HgvBan12t {
                    "12"
                } else {
                    "7.5"
                };
                if time.is_empty() {
                    tags.insert(format!("maxweight:hgv{dir}"), limit.to_string());
                } else {
                    tags.insert(
                        format!("maxweight:hgv{dir}:conditional"),
                        format!("{limit} @ {time}"),
                    );
                }
            }
            CommonSignature::MaxweightDeliveryOnly
            | CommonSignature::HgvBanDestinationDelivery => {}
        }
    }

    /// `DE:<type>[,<sign>...]` documenting the posted signs.
    pub fn traffic_sign(&self) -> String {
        let mut codes = vec![self.restriction_type.code().to_string()];
        codes.extend(self.signs.iter().map(RestrSign::sign_code));
        format!("DE:{}", codes.join(","))
    }
}

impl Keyed for RestrictionRecord {
    fn element_id(&self) -> i64 {
        self.osm_id
    }
}

impl SegmentRecord for RestrictionRecord {
    const KIND: LayerKind = LayerKind::Restrictions;

    fn record_id(&self) -> i64 {
        self.segment_id
    }

    fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    fn tags(&self) -> RewriteResult<Tags> {
        let time = self.time_expression()?;
        let mut tags = Tags::new();
        match self.classify() {
            RuleCase::Common(signature) => self.common_signature_tags(signature, &time, &mut tags),
            RuleCase::ExemptAndSpecify => {
                self.exemptor_tags(&time, &mut tags);
                self.specifier_tags(&time, &mut tags)?;
            }
            RuleCase::Exempt => {
                self.basic_tag(&time, &mut tags)?;
                self.exemptor_tags(&time, &mut tags);
            }
            RuleCase::Specify => self.specifier_tags(&time, &mut tags)?,
            RuleCase::Basic => self.basic_tag(&time, &mut tags)?,
            RuleCase::Fallback => {
                warn!(
                    segment = self.segment_id,
                    signature = %self.signature(),
                    "Restriction mixes special signs with exemptors or specifiers, using the basic tag"
                );
                self.basic_tag(&time, &mut tags)?;
            }
        }
        tags.insert("traffic_sign".to_string(), self.traffic_sign());
        Ok(tags)
    }

    fn is_fallback(&self) -> bool {
        self.classify() == RuleCase::Fallback
    }
}

#[cfg(test)]
impl RestrictionRecord {
    /// Whole-way record without signs or time condition.
    pub(crate) fn sample(osm_id: i64, restriction_type: RestrictionType, value: Option<&str>) -> Self {
        RestrictionRecord {
            segment_id: osm_id * 10,
            restriction_id: 1,
            name: None,
            osm_id,
            osm_version: None,
            direction: Direction::Both,
            restriction_type,
            value: value.map(str::to_string),
            weekdays: Weekdays::default(),
            grouped_days: GroupedDays::None,
            windows: [TimeWindow::default(); 2],
            admin: AdminArea::default(),
            signs: BTreeSet::new(),
            geometry: LineString::new(vec![]),
        }
    }

    pub(crate) fn with_signs(mut self, signs: &[RestrSign]) -> Self {
        self.signs = signs.iter().copied().collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse::parse_time_of_day;
    use super::*;
    use crate::error::RewriteError;
    use crate::osm::build_tags;

    fn window(from: &str, to: &str) -> TimeWindow {
        TimeWindow {
            from: parse_time_of_day(from),
            to: parse_time_of_day(to),
        }
    }

    fn tags_of(record: &RestrictionRecord) -> Tags {
        record.tags().unwrap()
    }

    fn expected(pairs: &[(&str, &str)]) -> Tags {
        build_tags(pairs.iter().copied())
    }

    #[test]
    fn plain_records_yield_basic_tag_and_sign() {
        let types = [
            RestrictionType::HgvBan,
            RestrictionType::HgvTrailer,
            RestrictionType::Hazmat,
            RestrictionType::Weight,
            RestrictionType::AxleLoad,
            RestrictionType::Width,
            RestrictionType::Height,
            RestrictionType::Length,
            RestrictionType::HazmatWater,
        ];
        for restriction_type in types {
            let record = RestrictionRecord::sample(1, restriction_type, Some("3,5"));
            let tags = tags_of(&record);
            assert_eq!(tags.len(), 2, "{restriction_type:?}");
            let expected_value = if restriction_type.is_dimensional() {
                "3.5"
            } else {
                "no"
            };
            assert_eq!(tags[restriction_type.key()], expected_value);
            assert_eq!(tags["traffic_sign"], format!("DE:{}", restriction_type.code()));
        }
    }

    #[test]
    fn height_limit() {
        let record = RestrictionRecord::sample(1, RestrictionType::Height, Some("3,1"));
        assert_eq!(
            tags_of(&record),
            expected(&[("maxheight", "3.1"), ("traffic_sign", "DE:265")])
        );
    }

    #[test]
    fn length_limit() {
        let record = RestrictionRecord::sample(1, RestrictionType::Length, Some("10"));
        assert_eq!(
            tags_of(&record),
            expected(&[("maxlength", "10"), ("traffic_sign", "DE:266")])
        );
    }

    #[test]
    fn hazmat_ban() {
        let record = RestrictionRecord::sample(1, RestrictionType::Hazmat, None);
        assert_eq!(
            tags_of(&record),
            expected(&[("hazmat", "no"), ("traffic_sign", "DE:261")])
        );
    }

    #[test]
    fn hgv_ban_destination_only() {
        let record = RestrictionRecord::sample(1, RestrictionType::HgvBan, None)
            .with_signs(&[RestrSign::Vz1020_30]);
        assert_eq!(record.signature(), "25300010000000000000000000");
        assert_eq!(
            tags_of(&record),
            expected(&[("hgv", "destination"), ("traffic_sign", "DE:253,1020-30")])
        );
    }

    #[test]
    fn hgv_ban_delivery_only() {
        let record = RestrictionRecord::sample(1, RestrictionType::HgvBan, None)
            .with_signs(&[RestrSign::Vz1026_35]);
        assert_eq!(
            tags_of(&record),
            expected(&[("hgv", "delivery"), ("traffic_sign", "DE:253,1026-35")])
        );
    }

    #[test]
    fn hgv_ban_delivery_only_with_time() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::HgvBan, None)
            .with_signs(&[RestrSign::Vz1026_35]);
        record.windows[0] = window("06:00", "22:00");
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("hgv:conditional", "no @ 06:00-22:00;yes @ delivery"),
                ("traffic_sign", "DE:253,1026-35"),
            ])
        );
    }

    #[test]
    fn hgv_ban_delivery_only_above_7_5t_forward() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::HgvBan, None)
            .with_signs(&[RestrSign::Vz1026_35, RestrSign::Vz1053_33]);
        record.direction = Direction::Forward;
        assert_eq!(record.signature(), "25300000000000100000000100");
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxweight:forward", "7.5"),
                ("maxweight:forward:conditional", "none @ delivery"),
                ("traffic_sign", "DE:253,1026-35,1053-33"),
            ])
        );
    }

    #[test]
    fn hgv_ban_above_12t_with_weekdays() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::HgvBan, None)
            .with_signs(&[RestrSign::Vz1053_37]);
        record.grouped_days = GroupedDays::Weekdays;
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxweight:hgv:conditional", "12 @ (Mo-Fr)"),
                ("traffic_sign", "DE:253,1053-37"),
            ])
        );
    }

    #[test]
    fn maxweight_delivery_only_uses_generic_exemption() {
        let record = RestrictionRecord::sample(1, RestrictionType::Weight, Some("3,5"))
            .with_signs(&[RestrSign::Vz1026_35]);
        assert_eq!(
            record.common_signature(),
            Some(CommonSignature::MaxweightDeliveryOnly)
        );
        assert_eq!(record.classify(), RuleCase::Exempt);
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxweight", "3.5"),
                ("maxweight:conditional", "none @ delivery"),
                ("traffic_sign", "DE:262,1026-35"),
            ])
        );
    }

    #[test]
    fn overnight_weight_limit() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::Weight, Some("4"));
        record.windows[0] = window("17:00", "08:00");
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxweight:conditional", "4 @ 17:00-08:00"),
                ("traffic_sign", "DE:262"),
            ])
        );
    }

    #[test]
    fn height_with_destination_exemption() {
        let record = RestrictionRecord::sample(1, RestrictionType::Height, Some("7,5"))
            .with_signs(&[RestrSign::Vz1020_30]);
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxheight", "7.5"),
                ("maxheight:conditional", "none @ destination"),
                ("traffic_sign", "DE:265,1020-30"),
            ])
        );
    }

    #[test]
    fn timed_exemptions_get_one_tag_per_mode() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::Height, Some("4"))
            .with_signs(&[RestrSign::Vz1020_30, RestrSign::Vz1024_14]);
        record.windows[0] = window("7:00", "19:00");
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxheight:conditional", "4 @ 07:00-19:00"),
                ("maxheight:destination", "none"),
                ("maxheight:bus", "none"),
                ("traffic_sign", "DE:265,1020-30,1024-14"),
            ])
        );
    }

    #[test]
    fn hgv_ban_keyable_exemptions_get_plain_tags() {
        let record = RestrictionRecord::sample(1, RestrictionType::HgvBan, None)
            .with_signs(&[RestrSign::Vz1024_14, RestrSign::Vz1026_35, RestrSign::Vz1026_36]);
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("hgv", "no"),
                ("bus", "yes"),
                ("agricultural", "yes"),
                ("hgv:conditional", "yes @ delivery"),
                ("traffic_sign", "DE:253,1024-14,1026-35,1026-36"),
            ])
        );
    }

    #[test]
    fn timed_hgv_ban_keeps_destination_under_the_hgv_key() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::HgvBan, None)
            .with_signs(&[RestrSign::Vz1020_30, RestrSign::Vz1024_14]);
        record.windows[0] = window("06:00", "22:00");
        let tags = tags_of(&record);
        assert!(!tags.contains_key("destination"));
        assert_eq!(
            tags,
            expected(&[
                ("hgv:conditional", "no @ 06:00-22:00"),
                ("hgv:destination", "yes"),
                ("bus", "yes"),
                ("traffic_sign", "DE:253,1020-30,1024-14"),
            ])
        );
    }

    #[test]
    fn weight_limit_for_hgv_only() {
        let record = RestrictionRecord::sample(1, RestrictionType::Weight, Some("5"))
            .with_signs(&[RestrSign::Vz1010_51]);
        assert_eq!(
            tags_of(&record),
            expected(&[("maxweight:hgv", "5"), ("traffic_sign", "DE:262,1010-51")])
        );
    }

    #[test]
    fn timed_specifier_is_conditional() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::Weight, Some("5"))
            .with_signs(&[RestrSign::Vz1010_57]);
        record.direction = Direction::Backward;
        record.grouped_days = GroupedDays::Weekdays;
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxweight:bus:backward:conditional", "5 @ (Mo-Fr)"),
                ("traffic_sign", "DE:262,1010-57"),
            ])
        );
    }

    #[test]
    fn exemptor_and_specifier_are_combined() {
        let record = RestrictionRecord::sample(1, RestrictionType::Width, Some("2"))
            .with_signs(&[RestrSign::Vz1010_51, RestrSign::Vz1020_30]);
        assert_eq!(record.classify(), RuleCase::ExemptAndSpecify);
        assert_eq!(
            tags_of(&record),
            expected(&[
                ("maxwidth:hgv", "2"),
                ("maxwidth:conditional", "none @ destination"),
                ("traffic_sign", "DE:264,1010-51,1020-30"),
            ])
        );
    }

    #[test]
    fn special_signs_fall_back_to_basic_tag() {
        let record = RestrictionRecord::sample(1, RestrictionType::Weight, Some("3,5"))
            .with_signs(&[RestrSign::Vz1020_30, RestrSign::Vz1053_37]);
        assert_eq!(record.classify(), RuleCase::Fallback);
        assert!(record.is_fallback());
        assert_eq!(
            tags_of(&record),
            expected(&[("maxweight", "3.5"), ("traffic_sign", "DE:262,1020-30,1053-37")])
        );
    }

    #[test]
    fn missing_dimensional_value_is_schema_error() {
        let record = RestrictionRecord::sample(1, RestrictionType::Weight, None);
        assert!(matches!(record.tags(), Err(RewriteError::Schema(_))));
        let record = RestrictionRecord::sample(1, RestrictionType::AxleLoad, Some(" "));
        assert!(matches!(record.tags(), Err(RewriteError::Schema(_))));
    }

    #[test]
    fn time_expression_renders_days_and_windows() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::Hazmat, None);
        record.weekdays = Weekdays::from_mask("1100000").unwrap();
        record.windows = [window("07:00", "12:00"), window("17:00", "23:00")];
        assert_eq!(
            record.time_expression().unwrap(),
            "Mo, Tu 07:00-12:00,17:00-23:00"
        );

        record.weekdays = Weekdays::from_mask("1111111").unwrap();
        assert_eq!(record.time_expression().unwrap(), "07:00-12:00,17:00-23:00");

        record.weekdays = Weekdays::default();
        record.grouped_days = GroupedDays::SundaysHolidays;
        record.windows = [TimeWindow::default(); 2];
        assert_eq!(record.time_expression().unwrap(), "(Su,PH)");

        record.grouped_days = GroupedDays::Daily;
        assert_eq!(record.time_expression().unwrap(), "");
    }

    #[test]
    fn unpaired_window_is_rejected() {
        let mut record = RestrictionRecord::sample(7, RestrictionType::Hazmat, None);
        record.windows[1] = TimeWindow {
            from: parse_time_of_day("08:00"),
            to: None,
        };
        assert!(matches!(
            record.time_expression(),
            Err(RewriteError::Geometry(GeometryError::UnpairedTimeWindow { record: 70 }))
        ));
    }

    #[test]
    fn single_and_grouped_days_conflict() {
        let mut record = RestrictionRecord::sample(1, RestrictionType::Hazmat, None);
        record.weekdays = Weekdays::from_mask("0000011").unwrap();
        record.grouped_days = GroupedDays::Weekdays;
        assert!(matches!(
            record.tags(),
            Err(RewriteError::Geometry(GeometryError::ConflictingDays { .. }))
        ));
    }

    #[test]
    fn weekday_mask_validation() {
        assert!(Weekdays::from_mask("0000000").unwrap().is_empty());
        assert!(Weekdays::from_mask("01").is_none());
        assert!(Weekdays::from_mask("00x0000").is_none());
    }
}
