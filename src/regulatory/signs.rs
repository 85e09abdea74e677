//! Additional traffic signs ("Zusatzzeichen") attached to restriction records.

/// Additional signs in canonical order. The order fixes the flag positions of
/// a restriction signature and the order of codes in `traffic_sign` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestrSign {
    Vz1010_51,
    Vz1010_57,
    Vz1010_60,
    Vz1020_30,
    Vz1024_12,
    Vz1024_13,
    Vz1024_14,
    Vz1026_31,
    Vz1026_32,
    Vz1026_33,
    Vz1026_34,
    Vz1026_35,
    Vz1026_36,
    Vz1026_37,
    Vz1026_38,
    Vz1026_39,
    Vz1026_62,
    Vz1048_14,
    Vz1048_15,
    Vz1049_13,
    Vz1053_33,
    Vz1053_36,
    Vz1053_37,
}

/// How a sign modifies the restriction it is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignCategory {
    /// Lifts the restriction for some traffic modes.
    Exemptor,
    /// Limits the restriction to some traffic modes.
    Specifier,
    /// Not modelled; forces the basic tag when mixed with others.
    Special,
}

impl RestrSign {
    pub const ALL: [RestrSign; 23] = [
        RestrSign::Vz1010_51,
        RestrSign::Vz1010_57,
        RestrSign::Vz1010_60,
        RestrSign::Vz1020_30,
        RestrSign::Vz1024_12,
        RestrSign::Vz1024_13,
        RestrSign::Vz1024_14,
        RestrSign::Vz1026_31,
        RestrSign::Vz1026_32,
        RestrSign::Vz1026_33,
        RestrSign::Vz1026_34,
        RestrSign::Vz1026_35,
        RestrSign::Vz1026_36,
        RestrSign::Vz1026_37,
        RestrSign::Vz1026_38,
        RestrSign::Vz1026_39,
        RestrSign::Vz1026_62,
        RestrSign::Vz1048_14,
        RestrSign::Vz1048_15,
        RestrSign::Vz1049_13,
        RestrSign::Vz1053_33,
        RestrSign::Vz1053_36,
        RestrSign::Vz1053_37,
    ];

    /// Attribute name in the regulatory source, e.g. `vz_1020_30`.
    pub fn field_name(&self) -> &'static str {
        match self {
            RestrSign::Vz1010_51 => "vz_1010_51",
            RestrSign::Vz1010_57 => "vz_1010_57",
            RestrSign::Vz1010_60 => "vz_1010_60",
            RestrSign::Vz1020_30 => "vz_1020_30",
            RestrSign::Vz1024_12 => "vz_1024_12",
            RestrSign::Vz1024_13 => "vz_1024_13",
            RestrSign::Vz1024_14 => "vz_1024_14",
            RestrSign::Vz1026_31 => "vz_1026_31",
            RestrSign::Vz1026_32 => "vz_1026_32",
            RestrSign::Vz1026_33 => "vz_1026_33",
            RestrSign::Vz1026_34 => "vz_1026_34",
            RestrSign::Vz1026_35 => "vz_1026_35",
            RestrSign::Vz1026_36 => "vz_1026_36",
            RestrSign::Vz1026_37 => "vz_1026_37",
            RestrSign::Vz1026_38 => "vz_1026_38",
            RestrSign::Vz1026_39 => "vz_1026_39",
            RestrSign::Vz1026_62 => "vz_1026_62",
            RestrSign::Vz1048_14 => "vz_1048_14",
            RestrSign::Vz1048_15 => "vz_1048_15",
            RestrSign::Vz1049_13 => "vz_1049_13",
            RestrSign::Vz1053_33 => "vz_1053_33",
            RestrSign::Vz1053_36 => "vz_1053_36",
            RestrSign::Vz1053_37 => "vz_1053_37",
        }
    }

    /// Sign code as written in `traffic_sign` values, e.g. `1020-30`.
    pub fn sign_code(&self) -> String {
        self.field_name()[3..].replace('_', "-")
    }

    pub fn category(&self) -> SignCategory {
        use RestrSign::*;
        match self {
            Vz1010_51 | Vz1010_57 | Vz1010_60 | Vz1048_14 => SignCategory::Specifier,
            Vz1020_30 | Vz1024_12 | Vz1024_13 | Vz1024_14 | Vz1026_31 | Vz1026_32 | Vz1026_33
            | Vz1026_34 | Vz1026_35 | Vz1026_36 | Vz1026_37 | Vz1026_38 | Vz1026_62
            | Vz1053_36 => SignCategory::Exemptor,
            Vz1026_39 | Vz1048_15 | Vz1049_13 | Vz1053_33 | Vz1053_37 => SignCategory::Special,
        }
    }

    /// Traffic modes an exemptor or specifier refers to. Empty for special signs.
    pub fn traffic_modes(&self) -> &'static [&'static str] {
        use RestrSign::*;
        match self {
            Vz1010_51 => &["hgv"],
            Vz1010_57 => &["bus"],
            Vz1010_60 => &["hgv:trailer"],
            Vz1048_14 => &["articulated_hgv"],
            Vz1020_30 | Vz1053_36 => &["destination"],
            Vz1024_12 => &["hgv"],
            Vz1024_13 => &["hgv", "trailer"],
            Vz1024_14 => &["bus"],
            Vz1026_31 => &["tourist_bus"],
            Vz1026_32 => &["psv"],
            Vz1026_33 | Vz1026_34 => &["emergency"],
            Vz1026_35 => &["delivery"],
            Vz1026_36 | Vz1026_62 => &["agricultural"],
            Vz1026_37 => &["forestry"],
            Vz1026_38 => &["agricultural", "forestry"],
            Vz1026_39 | Vz1048_15 | Vz1049_13 | Vz1053_33 | Vz1053_37 => &[],
        }
    }
}

/// Modes that are not vehicle classes and can only appear in conditions.
pub fn is_keyable(mode: &str) -> bool {
    !matches!(mode, "destination" | "delivery")
}
