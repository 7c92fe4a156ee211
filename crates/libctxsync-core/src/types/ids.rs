use thiserror::Error;
use uuid::Uuid;

/// Identifier of a shared context document
pub type ContextId = String;

/// Identifier of a snapshot
pub type SnapshotId = String;

/// Identifier of a conversation entity (decision, approach, blocker, next step)
pub type EntityId = String;

#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("ambiguous id prefix '{prefix}': matches {matches} entries")]
    Ambiguous { prefix: String, matches: usize },
}

/// Generate a fresh random id
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Short display form of an id (first 8 characters)
pub fn short_id(id: &str) -> &str {
    let end = id.char_indices().nth(8).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}

/// Resolve a user-supplied prefix against known ids.
///
/// Returns `Ok(None)` when nothing matches.
pub fn resolve_prefix<'a, I>(prefix: &str, ids: I) -> Result<Option<String>, IdParseError>
where
    I: IntoIterator<Item = &'a str>,
{
    let matches: Vec<&str> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].to_string())),
        n => {
            // An exact match beats longer ids sharing the prefix
            if let Some(exact) = matches.iter().find(|id| **id == prefix) {
                return Ok(Some(exact.to_string()));
            }
            Err(IdParseError::Ambiguous {
                prefix: prefix.to_string(),
                matches: n,
            })
        }
    }
}
