//! Rule tables driving metadata inference.
//!
//! Rules are evaluated top to bottom and the first match wins, so more specific entries must
//! stay above general ones. Extending classification means adding a row here.

/// Content-type tag assigned when every keyword appears in the lower-cased path.
pub(crate) struct ContentTypeRule {
    pub(crate) all_of: &'static [&'static str],
    pub(crate) tag: &'static str,
}

pub(crate) const DEFAULT_CONTENT_TYPE: &str = "general";

pub(crate) const CONTENT_TYPE_RULES: &[ContentTypeRule] = &[
    ContentTypeRule {
        all_of: &["session 1", "image creation"],
        tag: "session_1_image_creation",
    },
    ContentTypeRule {
        all_of: &["session 2", "4t"],
        tag: "session_2_4t_management",
    },
    ContentTypeRule {
        all_of: &["session 3", "capability"],
        tag: "session_3_capability",
    },
    ContentTypeRule {
        all_of: &["session 4", "pitch"],
        tag: "session_4_pitch",
    },
    ContentTypeRule {
        all_of: &["session 5", "bing fa"],
        tag: "session_5_strategy",
    },
    ContentTypeRule {
        all_of: &["session 6"],
        tag: "session_6_implementation",
    },
    ContentTypeRule {
        all_of: &["100 bm community"],
        tag: "community_session",
    },
    ContentTypeRule {
        all_of: &["lep revision"],
        tag: "revision_session",
    },
];

/// Curated titles keyed by session number.
pub(crate) const SESSION_TITLES: &[(u32, &str)] = &[
    (1, "Image Creation - Iron Lady Way"),
    (2, "4T Management for Operational Excellence"),
    (3, "Breakthrough Capability Development"),
    (4, "Pitch Without Pitching & Influencing Tactics"),
    (5, "Bing Fa Stratagem (11-Point Framework)"),
    (6, "Real-Time Implementation & Board Tips"),
];

/// Category assigned from the parent folder name (compared case-insensitively).
pub(crate) const FOLDER_CATEGORIES: &[(&str, &str)] =
    &[("100 bm community", "community"), ("lep revision", "revision")];

/// Captures that look like names but are structural words in course filenames.
pub(crate) const FACILITATOR_DENYLIST: &[&str] = &["Session", "Image", "Iron", "Lady", "Way"];

/// Special-category flags, each set when all keywords appear in the lower-cased target.
pub(crate) struct FlagRule {
    pub(crate) key: &'static str,
    pub(crate) scope: FlagScope,
    pub(crate) all_of: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub(crate) enum FlagScope {
    FileName,
    Path,
}

pub(crate) const FLAG_RULES: &[FlagRule] = &[
    FlagRule {
        key: "is_community",
        scope: FlagScope::Path,
        all_of: &["community"],
    },
    FlagRule {
        key: "is_boardroom_showcase",
        scope: FlagScope::FileName,
        all_of: &["boardroom", "showcase"],
    },
    FlagRule {
        key: "is_boardroom_sawaal",
        scope: FlagScope::FileName,
        all_of: &["boardroom sawaal"],
    },
    FlagRule {
        key: "is_industry_leader",
        scope: FlagScope::FileName,
        all_of: &["industry leader connect"],
    },
];
