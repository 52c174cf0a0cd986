pub const UNITS: &str = "units";
pub const SETS: &str = "sets";
pub const KANJI: &str = "kanji";
pub const SCHEDULE: &str = "schedule";
pub const META: &str = "meta";

// Link trees
pub const SET_UNITS: &str = "set_units";
pub const UNIT_SETS: &str = "unit_sets";
pub const UNIT_KANJI: &str = "unit_kanji";
pub const KANJI_UNITS: &str = "kanji_units";
pub const SET_KANJI: &str = "set_kanji";
pub const KANJI_SETS: &str = "kanji_sets";

// Secondary indexes
pub const KANJI_BY_CHARACTER: &str = "kanji_by_character";
pub const KANJI_BY_CREATED_AT: &str = "kanji_by_created_at";
