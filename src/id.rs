use chrono::Utc;

/// Generate a prefixed identifier: millisecond timestamp plus random suffix.
/// Used for session identifiers in log context; CallIds and sub-exchange ids
/// are plain counters owned by their session.
pub fn new_id(prefix: &str) -> String {
    let ts = Utc::now().timestamp_millis();
    let rand: u32 = rand::random();
    format!("{}_{}_{:08x}", prefix, ts, rand)
}

/// Short display form of a generated id (prefix plus random suffix).
pub fn short_id(id: &str) -> &str {
    match id.rsplit_once('_') {
        Some((_, suffix)) => suffix,
        None => id,
    }
}
