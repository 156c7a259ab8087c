//! Identifier aliases and UUID utilities

use uuid::Uuid;

pub type AttemptId = Uuid;
pub type AthleteId = Uuid;
pub type CompetitionId = Uuid;
pub type SessionId = Uuid;
pub type JudgeId = Uuid;
pub type RecordId = Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Parse UUID from string
pub fn parse(s: &str) -> Result<Uuid, uuid::Error> {
    Uuid::parse_str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn test_parse_roundtrip() {
        let id = generate();
        assert_eq!(parse(&id.to_string()).unwrap(), id);
        assert!(parse("not-a-uuid").is_err());
    }
}
