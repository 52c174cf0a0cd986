use crate::store::StoreError;

const SEPARATOR: char = ':';

fn validate_segment(kind: &str, value: &str) -> Result<(), StoreError> {
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{kind} must not be empty")));
    }
    if value.contains(SEPARATOR) {
        return Err(StoreError::Validation(format!(
            "{kind} must not contain '{SEPARATOR}'"
        )));
    }
    Ok(())
}

pub fn unit_key(unit_id: &str) -> Result<String, StoreError> {
    validate_segment("unit id", unit_id)?;
    Ok(unit_id.to_string())
}

pub fn set_key(set_id: &str) -> Result<String, StoreError> {
    validate_segment("set id", set_id)?;
    Ok(set_id.to_string())
}

pub fn kanji_key(kanji_id: &str) -> Result<String, StoreError> {
    validate_segment("kanji id", kanji_id)?;
    Ok(kanji_id.to_string())
}

pub fn kanji_character_key(character: &str) -> String {
    character.to_string()
}

/// Newest-first ordering: the timestamp is stored as `u64::MAX - ts`.
pub fn kanji_created_at_key(timestamp_ms: i64, kanji_id: &str) -> Result<String, StoreError> {
    validate_segment("kanji id", kanji_id)?;
    let ts = timestamp_ms.max(0) as u64;
    let reverse_ts = u64::MAX - ts;
    Ok(format!("{:020}:{}", reverse_ts, kanji_id))
}

/// First index key at or after which every entry is no newer than `timestamp_ms`.
pub fn kanji_created_at_start(timestamp_ms: i64) -> String {
    let ts = timestamp_ms.max(0) as u64;
    format!("{:020}:", u64::MAX - ts)
}

pub fn parse_created_at_item_key(key: &[u8]) -> Option<(i64, String)> {
    let text = std::str::from_utf8(key).ok()?;
    let (reverse_ts, id) = text.split_once(SEPARATOR)?;
    let reverse_ts = reverse_ts.parse::<u64>().ok()?;
    let ts = i64::try_from(u64::MAX.checked_sub(reverse_ts)?).ok()?;
    Some((ts, id.to_string()))
}

pub fn link_key(left_id: &str, right_id: &str) -> Result<String, StoreError> {
    validate_segment("link endpoint", left_id)?;
    validate_segment("link endpoint", right_id)?;
    Ok(format!("{}:{}", left_id, right_id))
}

pub fn link_prefix(left_id: &str) -> Result<String, StoreError> {
    validate_segment("link endpoint", left_id)?;
    Ok(format!("{}:", left_id))
}

pub fn schedule_state_key() -> &'static str {
    "state"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_at_key_orders_newest_first() {
        let newer = kanji_created_at_key(2000, "k2").unwrap();
        let older = kanji_created_at_key(1000, "k1").unwrap();
        assert!(newer < older);
    }

    #[test]
    fn created_at_key_parses_back() {
        let key = kanji_created_at_key(1_700_000_000_000, "abc").unwrap();
        let (ts, id) = parse_created_at_item_key(key.as_bytes()).unwrap();
        assert_eq!(ts, 1_700_000_000_000);
        assert_eq!(id, "abc");
    }

    #[test]
    fn start_key_sorts_before_same_timestamp_entries() {
        let start = kanji_created_at_start(1000);
        let entry = kanji_created_at_key(1000, "k").unwrap();
        let newer = kanji_created_at_key(1001, "k").unwrap();
        assert!(start < entry);
        assert!(newer < start);
    }

    #[test]
    fn separator_in_id_is_rejected() {
        assert!(unit_key("a:b").is_err());
        assert!(link_key("", "b").is_err());
        assert_eq!(link_key("s1", "u1").unwrap(), "s1:u1");
    }
}
